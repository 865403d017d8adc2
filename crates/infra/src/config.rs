//! Gateway configuration.

use std::str::FromStr;

use tablekit_core::{
    key::{DEFAULT_VERSION_WIDTH, MAX_VERSION_WIDTH, MIN_VERSION_WIDTH},
    MAX_BATCH_WRITE_ITEMS,
};

/// Default number of items `query` accumulates when the caller gives no limit.
pub const DEFAULT_QUERY_LIMIT: usize = 200;

/// How a versioned create retires the previous head.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum VersioningMode {
    /// Retag and insert in one store transaction.
    #[default]
    Atomic,
    /// Retag, then insert, as independent calls with no rollback.
    Sequential,
}

impl FromStr for VersioningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(VersioningMode::Atomic),
            "sequential" => Ok(VersioningMode::Sequential),
            other => Err(format!("unknown versioning mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Items `query` stops at when no explicit limit is given. 0 means unbounded.
    pub query_limit: usize,
    /// Keys per batched write request (clamped to 1..=25).
    pub max_batch_items: usize,
    /// Default read consistency for entity lookups.
    pub consistent_reads: bool,
    pub versioning: VersioningMode,
    /// Zero-padding width of version segments in sort keys (10..=20).
    pub version_width: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            query_limit: DEFAULT_QUERY_LIMIT,
            max_batch_items: MAX_BATCH_WRITE_ITEMS,
            consistent_reads: false,
            versioning: VersioningMode::Atomic,
            version_width: DEFAULT_VERSION_WIDTH,
        }
    }
}

impl GatewayConfig {
    /// Read overrides from `TABLEKIT_*` environment variables.
    ///
    /// Invalid values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            query_limit: parse_or("TABLEKIT_QUERY_LIMIT", &lookup, defaults.query_limit),
            max_batch_items: parse_or("TABLEKIT_MAX_BATCH_ITEMS", &lookup, defaults.max_batch_items),
            consistent_reads: parse_or("TABLEKIT_CONSISTENT_READS", &lookup, defaults.consistent_reads),
            versioning: parse_or("TABLEKIT_VERSIONING", &lookup, defaults.versioning),
            version_width: parse_or("TABLEKIT_VERSION_WIDTH", &lookup, defaults.version_width),
        }
        .normalized()
    }

    pub fn with_versioning(mut self, mode: VersioningMode) -> Self {
        self.versioning = mode;
        self
    }

    pub fn with_query_limit(mut self, limit: usize) -> Self {
        self.query_limit = limit;
        self
    }

    pub fn with_max_batch_items(mut self, max: usize) -> Self {
        self.max_batch_items = max;
        self.normalized()
    }

    pub fn with_version_width(mut self, width: usize) -> Self {
        self.version_width = width;
        self.normalized()
    }

    /// Clamp batch size to 1..=25 and version width to 10..=20.
    pub(crate) fn normalized(mut self) -> Self {
        self.max_batch_items = self.max_batch_items.clamp(1, MAX_BATCH_WRITE_ITEMS);
        let width = self.version_width.clamp(MIN_VERSION_WIDTH, MAX_VERSION_WIDTH);
        if width != self.version_width {
            tracing::warn!(requested = self.version_width, width, "version width out of range; clamped");
            self.version_width = width;
        }
        self
    }
}

fn parse_or<T: FromStr>(name: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T {
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "invalid value; using default");
            default
        }),
    }
}
