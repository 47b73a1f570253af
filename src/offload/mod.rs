//! CDN offload subsystem.
//!
//! # Data Flow
//! ```text
//! [offload] config section
//!     → rules.rs (normalize hosts/paths/extensions, compile matcher)
//!     → Arc<OffloadRuleSet> (process-wide, swapped on reload)
//!
//! Per request:
//!     RequestContext (tls, bypass)
//!     → rewriter.rs (AssetUrlRewriter bound to the current rule set)
//!     → registered as an OutputFilter in the output pipeline
//! ```

pub mod rewriter;
pub mod rules;

pub use rewriter::{AssetUrlRewriter, RequestContext, Scheme, SlashStyle, UrlMatch};
pub use rules::OffloadRuleSet;
