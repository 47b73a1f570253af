//! Output rewrite subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → middleware.rs (build RequestContext, register filters)
//!     → pipeline.rs (any filter enabled? if not, pass through)
//!     → origin response fully buffered
//!     → final flush: every enabled filter, in registration order
//!     → rewritten body sent to client
//! ```

use std::borrow::Cow;

pub mod middleware;
pub mod pipeline;

pub use middleware::{rewrite_output, OutputSettings, SharedOutputSettings};
pub use pipeline::{OutputBuffer, OutputPipeline};

/// A text transform applied to a complete response body.
pub trait OutputFilter: Send + Sync + std::fmt::Debug {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Whether this filter participates in the current request.
    fn enabled(&self) -> bool;

    /// Transform the body. Return `Cow::Borrowed` when nothing changed.
    fn apply<'t>(&self, text: &'t str) -> Cow<'t, str>;
}
