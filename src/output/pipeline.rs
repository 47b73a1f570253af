//! Ordered output filter pipeline.
//!
//! # Responsibilities
//! - Hold text filters in registration order
//! - Decide once per request whether any filter is enabled
//! - Buffer output and run filters only at the final flush
//!
//! # Design Decisions
//! - No priorities: registration order is the execution order
//! - A pipeline with no enabled filter never buffers
//! - Filters see one contiguous body so no URL is split across chunks

use std::borrow::Cow;

use crate::observability::metrics;
use crate::output::OutputFilter;

/// Filters registered for one response.
#[derive(Debug, Default)]
pub struct OutputPipeline {
    filters: Vec<Box<dyn OutputFilter>>,
}

impl OutputPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter. It runs after every filter registered before it.
    pub fn register<F>(&mut self, filter: F) -> &mut Self
    where
        F: OutputFilter + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// True when at least one registered filter is enabled.
    pub fn is_active(&self) -> bool {
        self.filters.iter().any(|f| f.enabled())
    }

    /// Begin intercepting output.
    ///
    /// Returns `None` when nothing is enabled, in which case the caller sends
    /// the response as is. Enabled-ness is evaluated here, once.
    pub fn start(self) -> Option<OutputBuffer> {
        let enabled: Vec<Box<dyn OutputFilter>> =
            self.filters.into_iter().filter(|f| f.enabled()).collect();

        if enabled.is_empty() {
            return None;
        }

        tracing::debug!(
            filters = ?enabled.iter().map(|f| f.name()).collect::<Vec<_>>(),
            "Output buffering started"
        );

        Some(OutputBuffer {
            filters: enabled,
            buffer: Vec::new(),
        })
    }
}

/// Accumulates output chunks; filters run on `finish`.
#[derive(Debug)]
pub struct OutputBuffer {
    filters: Vec<Box<dyn OutputFilter>>,
    buffer: Vec<u8>,
}

impl OutputBuffer {
    /// Append an intermediate chunk. No filter runs yet.
    pub fn write(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of bytes buffered so far.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Final flush: run every enabled filter in order over the whole body.
    ///
    /// A body that is not UTF-8 is released unmodified.
    pub fn finish(self) -> Vec<u8> {
        let outcome = std::str::from_utf8(&self.buffer).map(|text| {
            match run_filters(&self.filters, text) {
                Cow::Borrowed(_) => None,
                Cow::Owned(rewritten) => Some(rewritten),
            }
        });

        match outcome {
            Ok(Some(rewritten)) => {
                metrics::record_rewrite("rewritten");
                rewritten.into_bytes()
            }
            Ok(None) => {
                metrics::record_rewrite("unchanged");
                self.buffer
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = self.buffer.len(), "Output is not UTF-8, sending unmodified");
                metrics::record_rewrite("skipped_non_utf8");
                self.buffer
            }
        }
    }
}

/// Feed each filter's output into the next one.
pub fn run_filters<'t>(filters: &[Box<dyn OutputFilter>], text: &'t str) -> Cow<'t, str> {
    let mut current = Cow::Borrowed(text);
    for filter in filters {
        let next = match filter.apply(&current) {
            Cow::Borrowed(_) => continue,
            Cow::Owned(s) => s,
        };
        current = Cow::Owned(next);
    }
    current
}
