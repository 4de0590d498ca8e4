//! Per-entry validation, fetching and metadata extraction.

use std::fmt;

use bpindex_oci::{FetchError, FetchErrorKind, ImageConfig, OciReference};

use crate::{
    entry::Entry,
    metadata::{Metadata, METADATA_LABEL},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NotContentAddressed,
    FetchFailed,
    MetadataMissing,
    MetadataMalformed,
    IdentityMismatch,
    VersionMismatch,
    SinkFailed,
}

impl FailureKind {
    pub const ALL: [FailureKind; 7] = [
        FailureKind::NotContentAddressed,
        FailureKind::FetchFailed,
        FailureKind::MetadataMissing,
        FailureKind::MetadataMalformed,
        FailureKind::IdentityMismatch,
        FailureKind::VersionMismatch,
        FailureKind::SinkFailed,
    ];
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotContentAddressed => "not-content-addressed",
            Self::FetchFailed => "fetch-failed",
            Self::MetadataMissing => "metadata-missing",
            Self::MetadataMalformed => "metadata-malformed",
            Self::IdentityMismatch => "identity-mismatch",
            Self::VersionMismatch => "version-mismatch",
            Self::SinkFailed => "sink-failed",
        };
        write!(f, "{name}")
    }
}

/// Why an entry was not committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Set for [`FailureKind::FetchFailed`].
    pub cause: Option<FetchErrorKind>,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            cause: None,
            detail: detail.into(),
        }
    }

    pub fn fetch(address: &str, err: &FetchError) -> Self {
        let cause = err.kind();
        Self {
            kind: FailureKind::FetchFailed,
            cause: Some(cause),
            detail: format!("{cause}: fetching config for {address}: {err}"),
        }
    }

    /// Only network failures and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::FetchFailed
            && matches!(
                self.cause,
                Some(FetchErrorKind::Network | FetchErrorKind::Timeout)
            )
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail)
    }
}

/// What a worker hands back to the aggregator for one entry.
#[derive(Debug, Clone)]
pub enum EntryResult {
    Extracted { entry: Entry, metadata: Metadata },
    Failed { entry: Entry, failure: Failure },
}

/// Parses the entry's address, refusing anything not pinned to a digest.
pub fn validate_address(entry: &Entry, default_registry: &str) -> Result<OciReference, Failure> {
    OciReference::parse_with_registry(&entry.address, default_registry)
        .map_err(|err| Failure::new(FailureKind::NotContentAddressed, err.to_string()))
}

/// Reads [`METADATA_LABEL`] from `config` and checks it against `entry`.
///
/// The ID is compared before the version, so an entry that disagrees on
/// both is reported as an identity mismatch.
pub fn extract_metadata(entry: &Entry, config: &ImageConfig) -> Result<Metadata, Failure> {
    let address = &entry.address;

    let label = config.label(METADATA_LABEL).ok_or_else(|| {
        Failure::new(
            FailureKind::MetadataMissing,
            format!("could not find metadata label for {address}"),
        )
    })?;

    let metadata = Metadata::parse(label).map_err(|err| {
        Failure::new(
            FailureKind::MetadataMalformed,
            format!("invalid metadata label for {address}: {err}"),
        )
    })?;

    let expected_id = entry.id();
    if metadata.id != expected_id {
        return Err(Failure::new(
            FailureKind::IdentityMismatch,
            format!(
                "invalid ID for {address}: expected '{expected_id}', found '{}'",
                metadata.id
            ),
        ));
    }

    if metadata.version != entry.version {
        return Err(Failure::new(
            FailureKind::VersionMismatch,
            format!(
                "invalid version for {address}: expected '{}', found '{}'",
                entry.version, metadata.version
            ),
        ));
    }

    Ok(metadata)
}
