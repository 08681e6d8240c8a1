//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → tracing.rs (one span per accepted connection)
//!
//! Consumers:
//!     → logging.rs (fmt subscriber on stdout, filtered by EnvFilter)
//! ```

pub mod logging;
pub mod tracing;

pub use logging::init_logging;
pub use self::tracing::connection_span;
