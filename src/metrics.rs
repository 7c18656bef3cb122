//! Mutation-event sink supplied by the embedder.
//!
//! The vault reports every committed mutation to the sink.  It never
//! waits on the sink to commit and a sink failure never fails the
//! operation that triggered it.

use std::error::Error;
use std::fmt;

use uuid::Uuid;

/// The kind of mutation a vault operation performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Added,
    Updated,
    Touched,
    Deleted,
}

impl Mutation {
    pub fn as_str(self) -> &'static str {
        match self {
            Mutation::Added => "added",
            Mutation::Updated => "updated",
            Mutation::Touched => "touched",
            Mutation::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives `(mutation, id, fields)` after each committed mutation.
/// `fields` names the changed fields for updates, comma-joined.
pub trait MetricsSink {
    fn record(
        &self,
        mutation: Mutation,
        id: &Uuid,
        fields: Option<&str>,
    ) -> std::result::Result<(), Box<dyn Error>>;
}

/// Sink that drops every event.  The default.
#[derive(Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(
        &self,
        _mutation: Mutation,
        _id: &Uuid,
        _fields: Option<&str>,
    ) -> std::result::Result<(), Box<dyn Error>> {
        Ok(())
    }
}
