//! Wire-protocol surface the sync client drives.
//!
//! The codec and transport themselves live outside this crate's covered
//! surface — this module only defines the already-decoded frame values
//! (`types`) and the seam the client talks through (`transport`), keeping
//! the messages themselves separate from how they'd cross an actual wire.

pub mod transport;
pub mod types;
