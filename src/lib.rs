pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod post;
pub mod protocol;

pub use client::{Command, Event, SyncClient, SyncHandle};
pub use config::{HydraConfig, PeerCursor};
pub use error::HydraError;
pub use ledger::Ledger;
pub use post::{Post, PostContent};
pub use protocol::transport::{Connector, Transport};
pub use protocol::types::{ClientFrame, HeaderFields, ServerFrame, StatusCode};
