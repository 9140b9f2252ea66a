//! The sync client: a single-threaded cooperative actor driving one
//! protocol session.
//!
//! A cheap-to-clone `SyncHandle` lets the owning process send commands and
//! subscribe to events; `SyncClient` owns construction and all mutable
//! actor state, moved into the `tokio::select!` loop for the duration of
//! `run`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::{HydraConfig, PeerCursor};
use crate::error::HydraError;
use crate::ledger::Ledger;
use crate::post::Post;
use crate::protocol::transport::{Connector, Transport};
use crate::protocol::types::{ClientFrame, HeaderFields, ServerFrame, StatusCode, HEAD};

/// How often to ping the server while idle with an open session.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Consecutive missed heartbeats before the server is declared dead.
const MAX_HEARTBEAT_RETRIES: u32 = 3;
/// How long to wait for a reply to a protocol request issued during sync.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Maximum size of a single content chunk fetched per post.
const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Commands the owning process sends to the actor.
#[derive(Debug, Clone)]
pub enum Command {
    Connect { endpoint: String, timeout_ms: u64 },
    Sync,
    Destroy,
    Verbose(bool),
}

/// Events the actor emits. `Connected`/the connect-scoped `Success`/
/// `Failure` go out on the command channel; `Post`/the sync-scoped
/// `Success`/`Failure` go out on the message channel. Both channels share
/// this one type since the payload shapes are identical; which channel a
/// given event arrived on is what tells a listener which meaning applies.
#[derive(Debug, Clone)]
pub enum Event {
    Connected { nickname: String },
    Success(i64),
    Failure { code: i32, reason: String },
    Post(Post),
}

/// Cheap-to-clone handle to a running `SyncClient`.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<Command>,
    cmd_events: broadcast::Sender<Event>,
    msg_events: broadcast::Sender<Event>,
}

impl SyncHandle {
    pub fn subscribe_command_events(&self) -> broadcast::Receiver<Event> {
        self.cmd_events.subscribe()
    }

    pub fn subscribe_message_events(&self) -> broadcast::Receiver<Event> {
        self.msg_events.subscribe()
    }

    pub async fn connect(
        &self,
        endpoint: impl Into<String>,
        timeout_ms: u64,
    ) -> Result<(), HydraError> {
        self.cmd_tx
            .send(Command::Connect {
                endpoint: endpoint.into(),
                timeout_ms,
            })
            .await
            .map_err(|_| HydraError::Shutdown)
    }

    pub async fn sync(&self) -> Result<(), HydraError> {
        self.cmd_tx
            .send(Command::Sync)
            .await
            .map_err(|_| HydraError::Shutdown)
    }

    pub async fn destroy(&self) {
        let _ = self.cmd_tx.send(Command::Destroy).await;
    }

    pub async fn set_verbose(&self, verbose: bool) {
        let _ = self.cmd_tx.send(Command::Verbose(verbose)).await;
    }
}

/// Which way the history walk is currently moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    /// New-peer flow's initial probe: "what's your tip?"
    AskHead,
    /// Walking toward older posts than our current `oldest`.
    Backward,
    /// Walking toward newer posts than our current `newest`.
    Forward,
}

/// The sync actor. Generic over `Connector` so tests can run the exact
/// state machine over an in-memory `MockTransport` instead of a real
/// socket.
pub struct SyncClient<C: Connector> {
    connector: C,
    working_dir: PathBuf,
    config: HydraConfig,
    cmd_rx: mpsc::Receiver<Command>,
    cmd_events: broadcast::Sender<Event>,
    msg_events: broadcast::Sender<Event>,
    handle: SyncHandle,

    session: Option<C::Transport>,
    heartbeat: Option<tokio::time::Interval>,
    retries: u32,
    cursor: Option<PeerCursor>,
    ledger: Ledger,
    verbose: bool,
}

impl<C: Connector> SyncClient<C> {
    /// Load `<working_dir>/hydra.cfg` (fatal if identity is missing) and
    /// build the actor. Does not connect or touch `posts/` yet.
    pub fn new(connector: C, working_dir: impl Into<PathBuf>) -> Result<Self, HydraError> {
        let working_dir = working_dir.into();
        let config = HydraConfig::load(&working_dir)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (cmd_events, _) = broadcast::channel(32);
        let (msg_events, _) = broadcast::channel(256);
        let handle = SyncHandle {
            cmd_tx,
            cmd_events: cmd_events.clone(),
            msg_events: msg_events.clone(),
        };
        let ledger = Ledger::new(working_dir.join("posts"));
        Ok(Self {
            connector,
            working_dir,
            config,
            cmd_rx,
            cmd_events,
            msg_events,
            handle,
            session: None,
            heartbeat: None,
            retries: 0,
            cursor: None,
            ledger,
            verbose: false,
        })
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Run the actor's command/heartbeat loop until `Destroy` or the
    /// handle is dropped. Intended to be `tokio::spawn`ed.
    pub async fn run(mut self) {
        self.ledger.load();
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Connect { endpoint, timeout_ms }) => {
                            self.handle_connect(endpoint, Duration::from_millis(timeout_ms)).await;
                        }
                        Some(Command::Sync) => self.handle_sync().await,
                        Some(Command::Verbose(v)) => self.verbose = v,
                        Some(Command::Destroy) | None => break,
                    }
                }
                _ = tick_or_pending(&mut self.heartbeat) => {
                    self.handle_heartbeat_tick().await;
                }
            }
        }
    }

    async fn handle_connect(&mut self, endpoint: String, timeout: Duration) {
        tracing::debug!("connecting to {endpoint}");
        let mut transport = match self.connector.connect(&endpoint, timeout).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("could not connect to {endpoint}: {e}");
                self.emit_cmd_failure("Bad server endpoint");
                return;
            }
        };

        let hello = ClientFrame::Hello {
            identity: self.config.identity.clone(),
            nickname: self.config.nickname.clone(),
        };
        if transport.send(hello).await.is_err() {
            self.emit_cmd_failure("Bad server endpoint");
            return;
        }

        match transport.recv(timeout).await {
            Ok(Some(ServerFrame::HelloOk { identity, nickname })) => {
                self.cursor = Some(PeerCursor::load_or_new(&self.working_dir, &identity, &nickname));
                self.session = Some(transport);
                self.retries = 0;
                let mut heartbeat =
                    interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.heartbeat = Some(heartbeat);
                let _ = self.cmd_events.send(Event::Connected { nickname });
                let _ = self.cmd_events.send(Event::Success(0));
            }
            _ => {
                self.emit_cmd_failure("Bad server endpoint");
            }
        }
    }

    fn emit_cmd_failure(&self, reason: &str) {
        let _ = self.cmd_events.send(Event::Failure {
            code: -1,
            reason: reason.to_string(),
        });
    }

    async fn handle_heartbeat_tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.send(ClientFrame::Ping).await.is_err() {
            self.expire_session().await;
            return;
        }
        match session.recv(HEARTBEAT_INTERVAL).await {
            Ok(Some(_reply)) => self.retries = 0,
            Ok(None) => self.retries += 1,
            Err(_) => self.retries += 1,
        }
        if self.retries >= MAX_HEARTBEAT_RETRIES {
            self.expire_session().await;
        }
    }

    async fn expire_session(&mut self) {
        tracing::warn!("server heartbeat expired, tearing down session");
        self.session = None;
        self.heartbeat = None;
        self.emit_cmd_failure("Unhandled error");
        let _ = self.msg_events.send(Event::Failure {
            code: -1,
            reason: "Unhandled error".to_string(),
        });
    }

    /// Walk the peer's post history, fetching and deduplicating against the
    /// live `Ledger` held across events (spec.md §9 note 2), then persist
    /// the peer cursor and report completion.
    async fn handle_sync(&mut self) {
        if self.session.is_none() {
            let _ = self.msg_events.send(Event::Failure {
                code: -1,
                reason: "Unhandled error".to_string(),
            });
            return;
        }

        let known_peer = self.cursor.as_ref().is_some_and(PeerCursor::is_known_peer);
        let mut phase = if known_peer { ScanPhase::Forward } else { ScanPhase::AskHead };
        let mut received: i64 = 0;

        let outcome: Result<(), HydraError> = loop {
            let ask_ident = match phase {
                ScanPhase::AskHead => HEAD.to_string(),
                ScanPhase::Backward => match self.cursor.as_ref().and_then(|c| c.oldest.clone()) {
                    Some(id) => id,
                    None => {
                        phase = ScanPhase::Forward;
                        continue;
                    }
                },
                ScanPhase::Forward => match self.cursor.as_ref().and_then(|c| c.newest.clone()) {
                    Some(id) => id,
                    None => break Ok(()),
                },
            };

            match self.request_header(&ask_ident).await {
                Ok(Some((ident, fields))) => {
                    if !self.ledger.contains(&ident) {
                        match self.fetch_and_commit(ident.clone(), fields).await {
                            Ok(()) => received += 1,
                            Err(e) => break Err(e),
                        }
                    } else {
                        tracing::debug!("skipping duplicate post {ident}");
                    }
                    match phase {
                        ScanPhase::AskHead => {
                            self.advance_backward(ident);
                            phase = ScanPhase::Backward;
                        }
                        ScanPhase::Backward => self.advance_backward(ident),
                        ScanPhase::Forward => self.advance_forward(ident),
                    }
                }
                Ok(None) => match phase {
                    // No HEAD at all — peer has nothing. Fall through to
                    // forward scan, which will also find nothing and end
                    // the sync cleanly.
                    ScanPhase::AskHead => phase = ScanPhase::Forward,
                    // Backward boundary hit: switch direction.
                    ScanPhase::Backward => phase = ScanPhase::Forward,
                    // Forward boundary hit: both directions exhausted.
                    ScanPhase::Forward => break Ok(()),
                },
                Err(e) => break Err(e),
            }
        };

        match outcome {
            Ok(()) => {
                if let Some(cursor) = &self.cursor {
                    if let Err(e) = cursor.save(&self.working_dir) {
                        tracing::warn!("could not persist peer cursor: {e}");
                    }
                }
                let _ = self.msg_events.send(Event::Success(received));
            }
            Err(e) => {
                let reason = unhandled_reason(&e);
                self.emit_cmd_failure(reason);
                let _ = self.msg_events.send(Event::Failure {
                    code: -1,
                    reason: reason.to_string(),
                });
            }
        }
    }

    /// Forward-scan cursor rule (spec.md §4.C.4): `newest := ident`; if
    /// `oldest` was unset, also set `oldest := newest`.
    fn advance_forward(&mut self, ident: String) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.newest = Some(ident.clone());
            if cursor.oldest.is_none() {
                cursor.oldest = Some(ident);
            }
        }
    }

    /// Backward-scan cursor rule (spec.md §4.C.4): `oldest := ident`; if
    /// `newest` was unset, also set `newest := oldest`.
    ///
    /// The original C (`use_this_post_as_oldest`, see
    /// `original_source/src/hydra_client.c`) re-reads `self->oldest` after
    /// writing `/peer/newest`, which spec.md §9 flags as almost certainly a
    /// typo for `self->newest`. This implements the corrected assignment —
    /// see DESIGN.md for the resolution.
    fn advance_backward(&mut self, ident: String) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.oldest = Some(ident.clone());
            if cursor.newest.is_none() {
                cursor.newest = Some(ident);
            }
        }
    }

    /// Send `GET-POST ident` and classify the reply. `Ok(None)` means the
    /// peer has no such post (scan boundary or empty history).
    async fn request_header(
        &mut self,
        ident: &str,
    ) -> Result<Option<(String, HeaderFields)>, HydraError> {
        let session = self.session.as_mut().ok_or(HydraError::Shutdown)?;
        if self.verbose {
            tracing::info!("-> GET-POST {ident}");
        }
        session
            .send(ClientFrame::GetPost { ident: ident.to_string() })
            .await?;
        let reply = session.recv(REQUEST_TIMEOUT).await?;
        if self.verbose {
            tracing::info!("<- {reply:?}");
        }
        match reply {
            Some(ServerFrame::HeaderOk { ident, fields }) => Ok(Some((ident, fields))),
            Some(ServerFrame::Error { status: StatusCode::NoSuchPost }) => Ok(None),
            Some(ServerFrame::Error { status: StatusCode::CommandInvalid }) => {
                Err(HydraError::ProtocolInvalid("peer rejected GET-POST".into()))
            }
            Some(ServerFrame::Error { status: StatusCode::Internal }) => {
                Err(HydraError::ServerInternal)
            }
            Some(other) => Err(HydraError::Transport(format!("unexpected reply: {other:?}"))),
            None => Err(HydraError::Transport("timed out waiting for reply".into())),
        }
    }

    /// Fetch the post's single content chunk, store it in the local ledger,
    /// and emit a `POST` event (spec.md §4.C.2 steps 6-8). Current design
    /// limits a post to one chunk (§9 note 3); `offset` is always `0`.
    async fn fetch_and_commit(
        &mut self,
        ident: String,
        fields: HeaderFields,
    ) -> Result<(), HydraError> {
        let session = self.session.as_mut().ok_or(HydraError::Shutdown)?;
        if self.verbose {
            tracing::info!("-> GET-POST-DATA offset=0 octets={CHUNK_SIZE}");
        }
        session
            .send(ClientFrame::GetPostData { offset: 0, octets: CHUNK_SIZE })
            .await?;
        let reply = session.recv(REQUEST_TIMEOUT).await?;
        if self.verbose {
            tracing::info!(
                "<- {} bytes",
                match &reply {
                    Some(ServerFrame::DataOk { content }) => content.len(),
                    _ => 0,
                }
            );
        }
        let content = match reply {
            Some(ServerFrame::DataOk { content }) => content,
            Some(ServerFrame::Error { status: StatusCode::Internal }) => {
                return Err(HydraError::ServerInternal)
            }
            Some(other) => return Err(HydraError::Transport(format!("unexpected reply: {other:?}"))),
            None => return Err(HydraError::Transport("timed out waiting for chunk".into())),
        };

        let mut post = Post::decode(fields);
        post.set_data(content);
        debug_assert_eq!(post.ident(), ident, "decoded post ident must match wire ident");

        self.ledger.store(post.dup())?;
        let _ = self.msg_events.send(Event::Post(post));
        Ok(())
    }
}

/// Map an internal error to the human-readable reason spec.md §4.C.5
/// assigns it. `BadEndpoint` is handled separately in `handle_connect` and
/// never reaches here.
fn unhandled_reason(e: &HydraError) -> &'static str {
    match e {
        HydraError::ServerInternal => "Internal server error",
        _ => "Unhandled error",
    }
}

async fn tick_or_pending(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
