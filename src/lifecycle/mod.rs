//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown.rs trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → server stops accepting, drains
//!              → reload task exits
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
