// mcol-common - Shared types and protocol definitions for the metrics collector
//
// This crate defines metric identity, the error taxonomy, and the wire format
// spoken between client endpoints and providers.

pub mod command;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

// Re-export for convenience
pub use command::*;
pub use error::*;
pub use identity::*;
pub use protocol::*;
pub use types::*;
