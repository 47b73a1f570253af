//! HTTP edge front.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request ID)
//!     → output middleware (decide whether to buffer)
//!     → server.rs (resolve origin through discovery, forward)
//!     → output middleware (rewrite final body)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::HttpServer;
