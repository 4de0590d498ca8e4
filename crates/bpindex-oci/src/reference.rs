//! Parsing of digest-qualified artifact addresses.

use std::{fmt, str::FromStr};

use miette::Diagnostic;
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use thiserror::Error;

/// Registry assumed when an address does not name one.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("address is not a digest: {address}")]
    #[diagnostic(
        code(bpindex_oci::not_content_addressed),
        help("Pin the address to a digest, e.g. `registry/repo@sha256:<hex>`")
    )]
    NotContentAddressed { address: String },

    #[error("invalid digest in {address}: {reason}")]
    #[diagnostic(code(bpindex_oci::invalid_digest))]
    InvalidDigest { address: String, reason: String },

    #[error("invalid repository in {address}: {reason}")]
    #[diagnostic(code(bpindex_oci::invalid_repository))]
    InvalidRepository { address: String, reason: String },
}

impl ReferenceError {
    /// The address that failed to parse.
    pub fn address(&self) -> &str {
        match self {
            Self::NotContentAddressed { address }
            | Self::InvalidDigest { address, .. }
            | Self::InvalidRepository { address, .. } => address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    fn hash_hex(self, bytes: &[u8]) -> String {
        let raw: Vec<u8> = match self {
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
            Self::Sha384 => Sha384::digest(bytes).to_vec(),
            Self::Sha512 => Sha512::digest(bytes).to_vec(),
        };
        raw.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        };
        write!(f, "{name}")
    }
}

/// A content digest such as `sha256:4e07...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Digest {
    /// Parses `<algorithm>:<hex>`, rejecting unknown algorithms and hex of
    /// the wrong length or case.
    pub fn parse(value: &str) -> Result<Self, String> {
        let (algorithm, hex) = value
            .split_once(':')
            .ok_or_else(|| format!("`{value}` is missing an algorithm prefix"))?;

        let algorithm = match algorithm {
            "sha256" => DigestAlgorithm::Sha256,
            "sha384" => DigestAlgorithm::Sha384,
            "sha512" => DigestAlgorithm::Sha512,
            other => return Err(format!("unsupported digest algorithm `{other}`")),
        };

        if hex.len() != algorithm.hex_len() {
            return Err(format!(
                "{algorithm} digest must have {} hex characters, found {}",
                algorithm.hex_len(),
                hex.len()
            ));
        }

        if !hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(format!("`{hex}` is not lowercase hex"));
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// Computes the digest of `bytes` with the given algorithm.
    pub fn of(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            hex: algorithm.hash_hex(bytes),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Checks `bytes` against this digest. On mismatch the digest actually
    /// found is returned.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), Digest> {
        let actual = Self::of(self.algorithm, bytes);
        if actual == *self {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// A parsed, digest-qualified artifact reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    pub digest: Digest,
}

impl OciReference {
    /// Parses an address, using [`DEFAULT_REGISTRY`] when none is named.
    pub fn parse(address: &str) -> Result<Self, ReferenceError> {
        Self::parse_with_registry(address, DEFAULT_REGISTRY)
    }

    /// Parses an address, using `default_registry` when none is named.
    ///
    /// Only `<name>@<digest>` forms are accepted. A tag may precede the
    /// digest (`repo:tag@sha256:...`) and is discarded; a bare tag or an
    /// unqualified name is [`ReferenceError::NotContentAddressed`].
    pub fn parse_with_registry(
        address: &str,
        default_registry: &str,
    ) -> Result<Self, ReferenceError> {
        let trimmed = address.trim();

        let Some((name, digest)) = trimmed.split_once('@') else {
            return Err(ReferenceError::NotContentAddressed {
                address: address.to_string(),
            });
        };

        let digest = Digest::parse(digest).map_err(|reason| {
            ReferenceError::InvalidDigest {
                address: address.to_string(),
                reason,
            }
        })?;

        let (registry, path) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest)
            }
            _ => (default_registry.to_string(), name),
        };

        let repository = strip_tag(path);
        let invalid = |reason: String| {
            ReferenceError::InvalidRepository {
                address: address.to_string(),
                reason,
            }
        };

        if registry.is_empty() {
            return Err(invalid("registry is empty".to_string()));
        }
        validate_repository(repository).map_err(invalid)?;

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository.to_string()
        };

        Ok(Self {
            registry,
            repository,
            digest,
        })
    }
}

impl FromStr for OciReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.registry, self.repository, self.digest)
    }
}

fn strip_tag(path: &str) -> &str {
    let last_slash = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[last_slash..].find(':') {
        Some(colon) => &path[..last_slash + colon],
        None => path,
    }
}

fn validate_repository(repository: &str) -> Result<(), String> {
    if repository.is_empty() {
        return Err("repository is empty".to_string());
    }

    for component in repository.split('/') {
        if component.is_empty() {
            return Err("repository has an empty path component".to_string());
        }

        let bytes = component.as_bytes();
        let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
            return Err(format!(
                "`{component}` must start and end with a lowercase letter or digit"
            ));
        }
        if !bytes
            .iter()
            .all(|&b| alnum(b) || b == b'.' || b == b'_' || b == b'-')
        {
            return Err(format!("`{component}` contains invalid characters"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "4e07408562bedb8b60ce05c1decfe3ad16b72230967de01f640b7e4729b49fce";

    fn digest() -> String {
        format!("sha256:{HEX}")
    }

    #[test]
    fn test_parse_digest_reference_with_registry() {
        let reference =
            OciReference::parse(&format!("registry.example/heroku/nodejs@{}", digest())).unwrap();

        assert_eq!(reference.registry, "registry.example");
        assert_eq!(reference.repository, "heroku/nodejs");
        assert_eq!(reference.digest.algorithm(), DigestAlgorithm::Sha256);
        assert_eq!(reference.digest.hex(), HEX);
    }

    #[test]
    fn test_parse_default_registry_and_library_prefix() {
        let reference = OciReference::parse(&format!("busybox@{}", digest())).unwrap();
        assert_eq!(reference.registry, DEFAULT_REGISTRY);
        assert_eq!(reference.repository, "library/busybox");

        let reference = OciReference::parse(&format!("heroku/nodejs@{}", digest())).unwrap();
        assert_eq!(reference.registry, DEFAULT_REGISTRY);
        assert_eq!(reference.repository, "heroku/nodejs");
    }

    #[test]
    fn test_parse_custom_default_registry() {
        let reference =
            OciReference::parse_with_registry(&format!("busybox@{}", digest()), "ghcr.io").unwrap();
        assert_eq!(reference.registry, "ghcr.io");
        assert_eq!(reference.repository, "busybox");
    }

    #[test]
    fn test_parse_registry_with_port_and_localhost() {
        let reference =
            OciReference::parse(&format!("localhost:5000/heroku/nodejs@{}", digest())).unwrap();
        assert_eq!(reference.registry, "localhost:5000");

        let reference = OciReference::parse(&format!("localhost/nodejs@{}", digest())).unwrap();
        assert_eq!(reference.registry, "localhost");
        assert_eq!(reference.repository, "nodejs");
    }

    #[test]
    fn test_parse_discards_tag_before_digest() {
        let reference =
            OciReference::parse(&format!("ghcr.io/heroku/nodejs:1.0.0@{}", digest())).unwrap();
        assert_eq!(reference.repository, "heroku/nodejs");
        assert_eq!(
            reference.to_string(),
            format!("ghcr.io/heroku/nodejs@{}", digest())
        );
    }

    #[test]
    fn test_tag_reference_is_not_content_addressed() {
        let err = OciReference::parse("registry.example/heroku/nodejs:latest").unwrap_err();
        assert_eq!(
            err,
            ReferenceError::NotContentAddressed {
                address: "registry.example/heroku/nodejs:latest".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "address is not a digest: registry.example/heroku/nodejs:latest"
        );
    }

    #[test]
    fn test_unqualified_reference_is_not_content_addressed() {
        let err = OciReference::parse("heroku/nodejs").unwrap_err();
        assert!(matches!(err, ReferenceError::NotContentAddressed { .. }));
        assert_eq!(err.address(), "heroku/nodejs");
    }

    #[test]
    fn test_invalid_digests() {
        for address in [
            "registry.example/heroku/nodejs@sha256:abc",
            "registry.example/heroku/nodejs@md5:d41d8cd98f00b204e9800998ecf8427e",
            "registry.example/heroku/nodejs@4e07408562bedb8b",
            &format!("registry.example/heroku/nodejs@sha256:{}", HEX.to_uppercase()),
        ] {
            let err = OciReference::parse(address).unwrap_err();
            assert!(
                matches!(err, ReferenceError::InvalidDigest { .. }),
                "{address} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_invalid_repositories() {
        for address in [
            format!("registry.example/@{}", digest()),
            format!("registry.example/Heroku/nodejs@{}", digest()),
            format!("registry.example/heroku//nodejs@{}", digest()),
            format!("registry.example/heroku/-nodejs@{}", digest()),
        ] {
            let err = OciReference::parse(&address).unwrap_err();
            assert!(
                matches!(err, ReferenceError::InvalidRepository { .. }),
                "{address} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_digest_verify() {
        let digest = Digest::of(DigestAlgorithm::Sha256, b"hello");
        assert_eq!(
            digest.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(digest.verify(b"hello").is_ok());

        let actual = digest.verify(b"world").unwrap_err();
        assert_ne!(actual, digest);
    }

    #[test]
    fn test_from_str() {
        let reference: OciReference = format!("quay.io/org/app@{}", digest()).parse().unwrap();
        assert_eq!(reference.registry, "quay.io");
    }
}
