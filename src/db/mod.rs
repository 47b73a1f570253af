//! Database query routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request start (method, path)
//!     → router.rs (initial state: ReadAllowed or MasterSticky)
//!
//! Each outbound query
//!     → ReadAllowed? classify.rs leading keyword check
//!         → write: escalate to MasterSticky
//!     → MasterSticky: append MASTER_MARKER
//!     → SQL execution layer (external proxy reads the marker)
//! ```

pub mod classify;
pub mod router;

pub use classify::is_read_query;
pub use router::{requires_master, QueryRouter, RoutingState, MASTER_MARKER};
