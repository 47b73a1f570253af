//! Asset URL rewriting.
//!
//! # Responsibilities
//! - Find local asset references inside arbitrary text (HTML, CSS, JS, JSON)
//! - Rewrite each one to the CDN host
//! - Never downgrade the scheme; upgrade to https on TLS requests
//! - Preserve literal vs. escaped slash style
//!
//! # Design Decisions
//! - The regex is an implementation detail behind `rewrite`
//! - Undecodable bodies are returned untouched

use std::borrow::Cow;
use std::sync::Arc;

use regex::Captures;

use crate::error::RewriteError;
use crate::offload::rules::OffloadRuleSet;
use crate::output::OutputFilter;

/// Per-request facts the rewriter depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// The request itself arrived over TLS.
    pub tls: bool,
    /// A bypass condition (kill switch, bypass header) is active.
    pub bypass: bool,
}

/// URL scheme of a matched reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Literal `/` or JSON-escaped `\/` separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashStyle {
    Literal,
    Escaped,
}

impl SlashStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlashStyle::Literal => "/",
            SlashStyle::Escaped => r"\/",
        }
    }

    fn of(separator: &str) -> Self {
        if separator.starts_with('\\') {
            SlashStyle::Escaped
        } else {
            SlashStyle::Literal
        }
    }
}

/// One asset reference found in a rewrite pass.
///
/// `path_and_file` always starts with a configured asset path prefix and
/// ends with `"." + extension`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatch<'t> {
    pub scheme: Option<Scheme>,
    pub slash_style: SlashStyle,
    pub host: Option<&'t str>,
    pub path_and_file: &'t str,
    pub extension: &'t str,
    lead: &'t str,
}

impl<'t> UrlMatch<'t> {
    fn from_captures(caps: &Captures<'t>) -> Option<Self> {
        let path = caps.name("path")?;
        let extension = caps.name("ext")?;

        let scheme = caps.name("scheme").map(|s| {
            if s.as_str().eq_ignore_ascii_case("https") {
                Scheme::Https
            } else {
                Scheme::Http
            }
        });

        let separator = caps
            .name("sep1")
            .or_else(|| caps.name("sep2"))
            .or_else(|| caps.name("first"))?;

        let host = caps
            .name("host1")
            .or_else(|| caps.name("host2"))
            .map(|h| h.as_str());

        Some(Self {
            scheme,
            slash_style: SlashStyle::of(separator.as_str()),
            host,
            path_and_file: path.as_str(),
            extension: extension.as_str(),
            lead: caps.name("lead").map(|l| l.as_str()).unwrap_or(""),
        })
    }

    /// Render the CDN form of this reference.
    pub fn to_cdn(&self, cdn_host: &str, tls: bool) -> String {
        let scheme = if tls || self.scheme == Some(Scheme::Https) {
            Scheme::Https
        } else {
            Scheme::Http
        };
        let slash = self.slash_style.as_str();
        format!(
            "{}{}:{}{}{}{}",
            self.lead,
            scheme.as_str(),
            slash,
            slash,
            cdn_host,
            self.path_and_file
        )
    }
}

/// Rewrites local asset URLs to the CDN host for one request.
#[derive(Debug, Clone)]
pub struct AssetUrlRewriter {
    rules: Arc<OffloadRuleSet>,
    context: RequestContext,
}

impl AssetUrlRewriter {
    pub fn new(rules: Arc<OffloadRuleSet>, context: RequestContext) -> Self {
        Self { rules, context }
    }

    /// Enabled when a CDN host is configured and no bypass is active.
    pub fn enabled(&self) -> bool {
        self.rules.is_active() && !self.context.bypass
    }

    /// All asset references in `text`, in order.
    pub fn find_matches<'t>(&self, text: &'t str) -> Vec<UrlMatch<'t>> {
        match self.rules.matcher() {
            Some(matcher) => matcher
                .captures_iter(text)
                .filter_map(|caps| UrlMatch::from_captures(&caps))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Rewrite every asset reference in `text`. A disabled rewriter returns
    /// `text` unchanged.
    pub fn rewrite<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let matcher = match self.rules.matcher() {
            Some(matcher) if !self.context.bypass => matcher,
            _ => return Cow::Borrowed(text),
        };

        let cdn_host = self.rules.cdn_host();
        let tls = self.context.tls;

        matcher.replace_all(text, |caps: &Captures<'_>| match UrlMatch::from_captures(caps) {
            Some(found) => found.to_cdn(cdn_host, tls),
            None => caps[0].to_string(),
        })
    }

    /// Rewrite a raw body. Bodies that are not UTF-8 are an error the caller
    /// answers by sending the original bytes.
    pub fn rewrite_bytes<'b>(&self, body: &'b [u8]) -> Result<Cow<'b, str>, RewriteError> {
        let text = std::str::from_utf8(body)?;
        Ok(self.rewrite(text))
    }
}

impl OutputFilter for AssetUrlRewriter {
    fn name(&self) -> &str {
        "asset-offload"
    }

    fn enabled(&self) -> bool {
        AssetUrlRewriter::enabled(self)
    }

    fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.rewrite(text)
    }
}
