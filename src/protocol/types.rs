//! Frame types for the client-visible subset of the Hydra protocol.
//! Encoding/decoding these to bytes is the wire codec's job and lives
//! outside this crate — a real deployment bridges a `Transport` impl to a
//! codec that maps these frames to whatever bytes actually cross the wire.

/// Sentinel `ident` value meaning "give me your tip post".
pub const HEAD: &str = "HEAD";

/// The six identity fields carried by `HEADER-OK` (and by `Post::encode`) —
/// everything but the `ident` itself, which is a pure function of these and
/// is never stored or sent separately; it's only echoed alongside the
/// fields on read, as a convenience for dedup (`ServerFrame::HeaderOk`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFields {
    pub subject: String,
    pub timestamp: String,
    pub parent_id: String,
    pub mime_type: String,
    pub digest: String,
    pub content_size: u64,
}

/// Status codes a server reply can carry on `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    CommandInvalid,
    NoSuchPost,
    Internal,
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Hello { identity: String, nickname: String },
    GetPost { ident: String },
    GetPostData { offset: u64, octets: u64 },
    Ping,
    Goodbye,
}

/// Frames the client receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    HelloOk { identity: String, nickname: String },
    HeaderOk { ident: String, fields: HeaderFields },
    DataOk { content: Vec<u8> },
    PingOk,
    GoodbyeOk,
    Error { status: StatusCode },
}
