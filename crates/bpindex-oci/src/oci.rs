use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use ureq::{
    http::{
        header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE},
        Response,
    },
    Agent, Body,
};
use url::Url;

use crate::{
    error::FetchError,
    http_client::ClientConfig,
    reference::{Digest, OciReference},
};

const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json";

/// Retrieves the configuration object of a content-addressed artifact.
///
/// Implementations must be shareable across the worker tasks of a batch.
pub trait ArtifactFetcher: Send + Sync {
    fn fetch_config(&self, reference: &OciReference) -> Result<ImageConfig, FetchError>;
}

/// The image configuration blob. Only the parts the index needs are kept.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub config: ContainerConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContainerConfig {
    #[serde(rename = "Labels", default)]
    pub labels: Option<HashMap<String, String>>,
}

impl ImageConfig {
    /// Builds a config carrying only the given labels.
    pub fn with_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            config: ContainerConfig {
                labels: Some(
                    labels
                        .into_iter()
                        .map(|(k, v)| (k.into(), v.into()))
                        .collect(),
                ),
            },
            ..Default::default()
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.config
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciManifest {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    pub config: OciDescriptor,
    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciDescriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub platform: Option<OciPlatform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciPlatform {
    pub architecture: String,
    pub os: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciIndex {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    pub manifests: Vec<OciDescriptor>,
}

impl OciIndex {
    /// Picks the linux/amd64 manifest, falling back to the first entry.
    pub fn select(&self) -> Option<&OciDescriptor> {
        self.manifests
            .iter()
            .find(|m| {
                m.platform
                    .as_ref()
                    .is_some_and(|p| p.os == "linux" && p.architecture == "amd64")
            })
            .or_else(|| self.manifests.first())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Index(OciIndex),
    Image(OciManifest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let (scheme, params) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut values = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let after = after.trim_start();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            let end = after.find(',').unwrap_or(after.len());
            (&after[..end], &after[end..])
        };
        values.insert(key.trim().to_ascii_lowercase(), value.to_string());
        rest = remaining.trim_start_matches([',', ' ']);
    }

    Some(BearerChallenge {
        realm: values.remove("realm")?,
        service: values.remove("service"),
        scope: values.remove("scope"),
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// [`ArtifactFetcher`] backed by the OCI distribution API.
pub struct RegistryFetcher {
    agent: Agent,
    insecure: Vec<String>,
    token: Option<String>,
    anonymous_tokens: Mutex<HashMap<String, String>>,
}

impl RegistryFetcher {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            agent: config.build(),
            insecure: Vec::new(),
            token: None,
            anonymous_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Registries in this list are reached over plain HTTP.
    pub fn insecure_registries<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insecure = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Static bearer token sent with every request.
    pub fn token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn api_base(&self, reference: &OciReference) -> String {
        let scheme = if self.insecure.iter().any(|h| *h == reference.registry) {
            "http"
        } else {
            "https"
        };
        format!(
            "{scheme}://{}/v2/{}",
            reference.registry, reference.repository
        )
    }

    fn token_key(reference: &OciReference) -> String {
        format!("{}/{}", reference.registry, reference.repository)
    }

    fn send(
        &self,
        url: &str,
        accept: Option<&str>,
        token: Option<&str>,
    ) -> Result<Response<Body>, FetchError> {
        let mut req = self.agent.get(url);
        if let Some(accept) = accept {
            req = req.header(ACCEPT, accept);
        }
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, &format!("Bearer {token}"));
        }
        Ok(req.call()?)
    }

    /// GETs `url`, answering a single bearer challenge with an anonymous
    /// token when no static token is configured.
    fn get(
        &self,
        reference: &OciReference,
        url: &str,
        accept: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        let key = Self::token_key(reference);
        let cached = self
            .anonymous_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        let token = self.token.clone().or(cached);

        trace!("GET {url}");
        let mut resp = self.send(url, accept, token.as_deref())?;

        if resp.status().as_u16() == 401 && self.token.is_none() {
            let challenge = resp
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|h| h.to_str().ok())
                .and_then(parse_bearer_challenge);

            if let Some(challenge) = challenge {
                let anonymous = self.request_token(reference, &challenge)?;
                self.anonymous_tokens
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, anonymous.clone());
                resp = self.send(url, accept, Some(&anonymous))?;
            }
        }

        let status = resp.status().as_u16();
        match status {
            200..=299 => Ok(resp.body_mut().read_to_vec()?),
            404 => {
                Err(FetchError::NotFound {
                    url: url.to_string(),
                })
            }
            401 | 403 => {
                Err(FetchError::Unauthorized {
                    status,
                    url: url.to_string(),
                })
            }
            _ => {
                Err(FetchError::HttpError {
                    status,
                    url: url.to_string(),
                })
            }
        }
    }

    fn request_token(
        &self,
        reference: &OciReference,
        challenge: &BearerChallenge,
    ) -> Result<String, FetchError> {
        let mut url = Url::parse(&challenge.realm).map_err(|err| {
            FetchError::MalformedResponse {
                url: challenge.realm.clone(),
                reason: format!("invalid token realm: {err}"),
            }
        })?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            let scope = challenge
                .scope
                .clone()
                .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
            query.append_pair("scope", &scope);
        }

        debug!("requesting anonymous token from {}", challenge.realm);
        let mut resp = self.send(url.as_str(), None, None)?;
        let status = resp.status().as_u16();
        if !(200..=299).contains(&status) {
            return Err(FetchError::Unauthorized {
                status,
                url: challenge.realm.clone(),
            });
        }

        let body: TokenResponse = resp.body_mut().read_json().map_err(|err| {
            FetchError::MalformedResponse {
                url: challenge.realm.clone(),
                reason: err.to_string(),
            }
        })?;

        body.token
            .or(body.access_token)
            .ok_or_else(|| {
                FetchError::MalformedResponse {
                    url: challenge.realm.clone(),
                    reason: "token response carries no token".to_string(),
                }
            })
    }

    fn get_verified(
        &self,
        reference: &OciReference,
        url: &str,
        digest: &Digest,
        accept: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        let bytes = self.get(reference, url, accept)?;
        digest.verify(&bytes).map_err(|actual| {
            FetchError::DigestMismatch {
                url: url.to_string(),
                expected: digest.to_string(),
                actual: actual.to_string(),
            }
        })?;
        Ok(bytes)
    }

    fn fetch_manifest(
        &self,
        reference: &OciReference,
        digest: &Digest,
    ) -> Result<ManifestDocument, FetchError> {
        let url = format!("{}/manifests/{}", self.api_base(reference), digest);
        let bytes = self.get_verified(reference, &url, digest, Some(MANIFEST_ACCEPT))?;

        serde_json::from_slice(&bytes).map_err(|err| {
            FetchError::MalformedResponse {
                url,
                reason: err.to_string(),
            }
        })
    }

    fn parse_digest(url: &str, value: &str) -> Result<Digest, FetchError> {
        Digest::parse(value).map_err(|reason| {
            FetchError::MalformedResponse {
                url: url.to_string(),
                reason,
            }
        })
    }
}

impl ArtifactFetcher for RegistryFetcher {
    fn fetch_config(&self, reference: &OciReference) -> Result<ImageConfig, FetchError> {
        let base = self.api_base(reference);

        let manifest = match self.fetch_manifest(reference, &reference.digest)? {
            ManifestDocument::Image(manifest) => manifest,
            ManifestDocument::Index(index) => {
                let url = format!("{base}/manifests/{}", reference.digest);
                let selected = index.select().ok_or_else(|| {
                    FetchError::MalformedResponse {
                        url: url.clone(),
                        reason: "image index lists no manifests".to_string(),
                    }
                })?;
                let digest = Self::parse_digest(&url, &selected.digest)?;
                debug!("{reference} is an index, following {digest}");

                match self.fetch_manifest(reference, &digest)? {
                    ManifestDocument::Image(manifest) => manifest,
                    ManifestDocument::Index(_) => {
                        return Err(FetchError::MalformedResponse {
                            url,
                            reason: "nested image index".to_string(),
                        });
                    }
                }
            }
        };

        let config_url = format!("{base}/blobs/{}", manifest.config.digest);
        let config_digest = Self::parse_digest(&config_url, &manifest.config.digest)?;
        let bytes = self.get_verified(reference, &config_url, &config_digest, None)?;

        serde_json::from_slice(&bytes).map_err(|err| {
            FetchError::MalformedResponse {
                url: config_url,
                reason: err.to_string(),
            }
        })
    }
}
