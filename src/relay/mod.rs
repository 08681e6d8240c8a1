//! Downstream handler used by the `disguise-proxy` binary.
//!
//! # Data Flow
//! ```text
//! promoted stream → handler.rs → TCP upstream (copy_bidirectional)
//! rejected request → handler.rs → decoy page | declined
//! ```

pub mod handler;

pub use handler::{RelayError, RelayHandler};
