//! Content-addressed OCI references and registry access.
//!
//! [`reference`] turns an address string into an [`OciReference`], refusing
//! anything that is not pinned to a digest. [`oci`] defines the
//! [`ArtifactFetcher`] capability and [`RegistryFetcher`], its implementation
//! over the OCI distribution API.

pub mod error;
pub mod http_client;
pub mod oci;
pub mod reference;

pub use error::{FetchError, FetchErrorKind};
pub use oci::{ArtifactFetcher, ImageConfig, RegistryFetcher};
pub use reference::{Digest, DigestAlgorithm, OciReference, ReferenceError};
