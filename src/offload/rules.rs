//! Offload rule set: the compiled description of which URLs are local assets.
//!
//! # Responsibilities
//! - Normalize and deduplicate hosts, path prefixes and extensions
//! - Order extensions longest-first so `tar.gz` wins over `gz`
//! - Compile the single matching pattern once per configuration
//!
//! # Design Decisions
//! - Immutable after construction; a config change builds a new rule set
//!   which is published by atomic swap
//! - Every literal `/` in a path prefix accepts `\/` as well, so URLs inside
//!   JSON or JS string literals are recognized

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::config::OffloadConfig;
use crate::error::RewriteError;

/// Path separator accepting both literal and JSON-escaped slashes.
const SEP: &str = r"(?:/|\\/)";

/// Characters allowed in a path segment besides separators.
const PATH_CHARS: &str = r"[A-Za-z0-9_~+@%.\-]";

/// Boundaries that may precede a root-relative or scheme-relative URL.
const LEAD: &str = r#"(?P<lead>^|[\s"'(=,>\[]|\\n)"#;

const PATTERN_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// Compiled, immutable offload configuration.
#[derive(Debug, Clone)]
pub struct OffloadRuleSet {
    cdn_host: String,
    asset_hosts: BTreeSet<String>,
    asset_paths: BTreeSet<String>,
    extensions: Vec<String>,
    matcher: Option<Regex>,
}

impl OffloadRuleSet {
    /// Build from the `[offload]` config section.
    pub fn from_config(config: &OffloadConfig) -> Result<Self, RewriteError> {
        Self::new(
            &config.cdn_host,
            &config.asset_hosts,
            &config.asset_paths,
            &config.extensions,
        )
    }

    /// Build a rule set. An empty CDN host yields an inactive rule set.
    pub fn new<H, P, E>(
        cdn_host: &str,
        asset_hosts: H,
        asset_paths: P,
        extensions: E,
    ) -> Result<Self, RewriteError>
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let cdn_host = cdn_host.trim().to_string();

        let asset_hosts: BTreeSet<String> = asset_hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();

        let asset_paths: BTreeSet<String> = asset_paths
            .into_iter()
            .map(|p| p.as_ref().trim().trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let extensions = sort_extensions(extensions);

        let matcher = if cdn_host.is_empty() || asset_paths.is_empty() || extensions.is_empty() {
            None
        } else {
            let pattern = build_pattern(&asset_hosts, &asset_paths, &extensions);
            Some(
                RegexBuilder::new(&pattern)
                    .size_limit(PATTERN_SIZE_LIMIT)
                    .build()?,
            )
        };

        Ok(Self {
            cdn_host,
            asset_hosts,
            asset_paths,
            extensions,
            matcher,
        })
    }

    /// A rule set that never matches anything.
    pub fn disabled() -> Self {
        Self {
            cdn_host: String::new(),
            asset_hosts: BTreeSet::new(),
            asset_paths: BTreeSet::new(),
            extensions: Vec::new(),
            matcher: None,
        }
    }

    /// True when a CDN host is configured and the matcher compiled.
    pub fn is_active(&self) -> bool {
        self.matcher.is_some()
    }

    pub fn cdn_host(&self) -> &str {
        &self.cdn_host
    }

    pub fn asset_hosts(&self) -> &BTreeSet<String> {
        &self.asset_hosts
    }

    pub fn asset_paths(&self) -> &BTreeSet<String> {
        &self.asset_paths
    }

    /// Extensions, longest first.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub(crate) fn matcher(&self) -> Option<&Regex> {
        self.matcher.as_ref()
    }
}

impl Default for OffloadRuleSet {
    fn default() -> Self {
        Self::disabled()
    }
}

fn sort_extensions<E>(extensions: E) -> Vec<String>
where
    E: IntoIterator,
    E::Item: AsRef<str>,
{
    let unique: BTreeSet<String> = extensions
        .into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut sorted: Vec<String> = unique.into_iter().collect();
    // Stable sort keeps alphabetical order among equal lengths.
    sorted.sort_by(|a, b| b.len().cmp(&a.len()));
    sorted
}

fn alternation<'a>(items: impl IntoIterator<Item = &'a String>, slash_tolerant: bool) -> String {
    items
        .into_iter()
        .map(|item| {
            let escaped = regex::escape(item);
            if slash_tolerant {
                escaped.replace('/', SEP)
            } else {
                escaped
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn build_pattern(
    hosts: &BTreeSet<String>,
    paths: &BTreeSet<String>,
    extensions: &[String],
) -> String {
    let mut ordered_paths: Vec<&String> = paths.iter().collect();
    ordered_paths.sort_by(|a, b| b.len().cmp(&a.len()));

    let paths = alternation(ordered_paths, true);
    let exts = alternation(extensions, false);

    let prefix = if hosts.is_empty() {
        LEAD.to_string()
    } else {
        let hosts = alternation(hosts, false);
        format!(
            r"(?:\b(?P<scheme>(?i:https?)):(?P<sep1>//|\\/\\/)(?P<host1>(?i:{hosts}))|{LEAD}(?:(?P<sep2>//|\\/\\/)(?P<host2>(?i:{hosts})))?)"
        )
    };

    format!(
        r"{prefix}(?P<path>(?P<first>{SEP})(?:{paths}){SEP}(?:{PATH_CHARS}|{SEP})+?\.(?P<ext>(?i:{exts})))\b"
    )
}
