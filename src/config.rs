//! Vault construction options.

use std::path::PathBuf;

use crate::keyring::PersistedKeyring;
use crate::metrics::{MetricsSink, NoopSink};

/// Bucket name used when none is configured.
pub const DEFAULT_BUCKET: &str = "lockbox";

/// Options accepted by [`Vault::open`](crate::vault::Vault::open).
///
/// Only the base directory is required; everything else has a default.
pub struct VaultConfig {
    /// Directory holding bucket databases.
    pub dir: PathBuf,

    /// Bucket name; one vault per bucket.
    pub bucket: String,

    /// Persisted keyring adopted when the bucket holds none (e.g. one
    /// exported from another handle).
    pub keys: Option<PersistedKeyring>,

    /// Mutation-event sink.
    pub metrics: Box<dyn MetricsSink>,
}

impl VaultConfig {
    /// Configuration with defaults: bucket `"lockbox"`, no seeded
    /// keyring, no-op metrics sink.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            bucket: DEFAULT_BUCKET.to_string(),
            keys: None,
            metrics: Box::new(NoopSink),
        }
    }

    /// Use a different bucket name.
    pub fn bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    /// Seed a persisted keyring for buckets that hold none yet.
    pub fn keys(mut self, keys: PersistedKeyring) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Install a mutation-event sink.
    pub fn metrics(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }
}
