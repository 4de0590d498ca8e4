//! Fetch, validate and index buildpack metadata.
//!
//! A batch of [`Entry`] values is fanned out to concurrent workers that each
//! validate the address, fetch the image config through an
//! [`ArtifactFetcher`](bpindex_oci::ArtifactFetcher) and extract the
//! buildpackage metadata label. Results are fanned back in to a single
//! writer that commits them to an [`IndexSink`], producing a [`Report`] with
//! one [`Outcome`] per entry.

pub mod entry;
pub mod error;
pub mod extract;
pub mod index;
pub mod metadata;
pub mod report;
pub mod sink;

pub use entry::Entry;
pub use error::{BpIndexError, ErrorContext};
pub use extract::{extract_metadata, EntryResult, Failure, FailureKind};
pub use index::{process_batch, IndexOptions};
pub use metadata::{Metadata, Stack, METADATA_LABEL};
pub use report::{Outcome, Report};
pub use sink::{DbIndexSink, DryRunSink, IndexSink, SinkError};

pub type BpIndexResult<T> = std::result::Result<T, BpIndexError>;
