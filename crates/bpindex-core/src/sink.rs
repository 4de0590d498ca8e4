//! Destinations for validated entries.

use std::path::Path;

use bpindex_db::{DbConnection, DbError, IndexRepository, IndexedBuildpack, NewBuildpack};
use miette::Diagnostic;
use thiserror::Error;
use tracing::info;

use crate::{entry::Entry, metadata::Metadata};

#[derive(Error, Diagnostic, Debug)]
pub enum SinkError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DbError),

    #[error("{0}")]
    #[diagnostic(code(bpindex::sink))]
    Rejected(String),
}

/// Creates or updates the index record for a validated entry.
///
/// Calls for the same `(entry, metadata)` pair must be idempotent. The
/// aggregator holds the only `&mut` reference, so implementations never see
/// concurrent calls.
pub trait IndexSink {
    fn upsert(&mut self, entry: &Entry, metadata: &Metadata) -> Result<(), SinkError>;
}

impl<S: IndexSink + ?Sized> IndexSink for Box<S> {
    fn upsert(&mut self, entry: &Entry, metadata: &Metadata) -> Result<(), SinkError> {
        (**self).upsert(entry, metadata)
    }
}

/// Persists entries in the SQLite index.
pub struct DbIndexSink {
    db: DbConnection,
}

impl DbIndexSink {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Ok(Self::new(DbConnection::open(path)?))
    }

    pub fn find(&mut self, entry: &Entry) -> Result<Option<IndexedBuildpack>, DbError> {
        Ok(IndexRepository::find(
            self.db.conn(),
            &entry.namespace,
            &entry.name,
            &entry.version,
        )?)
    }

    pub fn count(&mut self) -> Result<i64, DbError> {
        Ok(IndexRepository::count(self.db.conn())?)
    }

    pub fn into_inner(self) -> DbConnection {
        self.db
    }
}

impl IndexSink for DbIndexSink {
    fn upsert(&mut self, entry: &Entry, metadata: &Metadata) -> Result<(), SinkError> {
        let stacks = metadata.stack_ids();
        let record = NewBuildpack::new(
            &entry.namespace,
            &entry.name,
            &entry.version,
            &entry.address,
            &metadata.id,
            &metadata.homepage,
            &stacks,
        );
        IndexRepository::upsert(self.db.conn(), &record).map_err(DbError::from)?;
        Ok(())
    }
}

/// Logs what would be written without touching any storage.
#[derive(Debug, Default)]
pub struct DryRunSink {
    upserts: usize,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upserts(&self) -> usize {
        self.upserts
    }
}

impl IndexSink for DryRunSink {
    fn upsert(&mut self, entry: &Entry, metadata: &Metadata) -> Result<(), SinkError> {
        info!(
            "[dry run] would index {} (stacks: {})",
            entry.identity(),
            metadata.stack_ids().join(", ")
        );
        self.upserts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::metadata::Stack;

    fn nodejs() -> (Entry, Metadata) {
        let entry = Entry::new(
            "heroku",
            "nodejs",
            "1.0.0",
            "ghcr.io/heroku/nodejs@sha256:abc",
        );
        let metadata = Metadata {
            id: "heroku/nodejs".to_string(),
            version: "1.0.0".to_string(),
            homepage: "https://github.com/heroku/buildpacks-nodejs".to_string(),
            stacks: vec![
                Stack {
                    id: "heroku-22".to_string(),
                },
                Stack {
                    id: "heroku-20".to_string(),
                },
            ],
        };
        (entry, metadata)
    }

    #[test]
    fn test_db_sink_upsert_twice_matches_once() {
        let dir = tempdir().unwrap();
        let mut sink = DbIndexSink::open(dir.path().join("index.db")).unwrap();
        let (entry, metadata) = nodejs();

        sink.upsert(&entry, &metadata).unwrap();
        let once = sink.find(&entry).unwrap().unwrap();

        sink.upsert(&entry, &metadata).unwrap();
        let twice = sink.find(&entry).unwrap().unwrap();

        assert_eq!(once, twice);
        assert_eq!(sink.count().unwrap(), 1);
        assert_eq!(twice.stacks, ["heroku-22", "heroku-20"]);
        assert_eq!(twice.address, entry.address);
    }

    #[test]
    fn test_dry_run_sink_counts() {
        let mut sink = DryRunSink::new();
        let (entry, metadata) = nodejs();
        sink.upsert(&entry, &metadata).unwrap();
        sink.upsert(&entry, &metadata).unwrap();
        assert_eq!(sink.upserts(), 2);
    }
}
