//! Credential pool with forward-only rotation
//!
//! Descriptors are enumerated from a directory in file-name order, which fixes
//! the rotation order across runs. Exactly one slot is active at a time; a
//! slot that was rotated away from (or failed to authenticate) is never used
//! again by the same pool.

use crate::error::CredentialError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A credential source: one file in the descriptor directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialDescriptor {
    /// Position in rotation order
    pub ordinal: usize,
    /// Descriptor file
    pub path: PathBuf,
}

impl CredentialDescriptor {
    /// File name used as a human-readable label
    pub fn label(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("credential-{}", self.ordinal))
    }
}

/// Secret material carried by a handle
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    /// Sent as the `key` query parameter
    ApiKey(String),
    /// Sent as a bearer token
    AccessToken(String),
}

/// Authenticated, read-only access handle for the remote API
#[derive(Clone)]
pub struct CredentialHandle {
    ordinal: usize,
    label: String,
    secret: Secret,
}

impl CredentialHandle {
    /// Create a handle
    pub fn new(ordinal: usize, label: impl Into<String>, secret: Secret) -> Self {
        Self {
            ordinal,
            label: label.into(),
            secret,
        }
    }

    /// Position of the credential in rotation order
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Human-readable label (descriptor file name)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Secret material
    pub fn secret(&self) -> &Secret {
        &self.secret
    }
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.secret {
            Secret::ApiKey(_) => "api_key",
            Secret::AccessToken(_) => "access_token",
        };
        f.debug_struct("CredentialHandle")
            .field("ordinal", &self.ordinal)
            .field("label", &self.label)
            .field("secret", &format_args!("<{kind} redacted>"))
            .finish()
    }
}

/// Builds a handle from a descriptor
///
/// This is the step that may block on an authentication round-trip.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate `descriptor` and return a usable handle
    async fn authenticate(
        &self,
        descriptor: &CredentialDescriptor,
    ) -> Result<CredentialHandle, CredentialError>;
}

/// Reads API keys or access tokens from descriptor files
///
/// Accepted formats: JSON `{"api_key": "..."}`, JSON `{"access_token": "..."}`,
/// or a plain-text file whose trimmed content is an API key.
#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorFileAuthenticator;

#[derive(Deserialize)]
struct DescriptorFile {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[async_trait]
impl Authenticator for DescriptorFileAuthenticator {
    async fn authenticate(
        &self,
        descriptor: &CredentialDescriptor,
    ) -> Result<CredentialHandle, CredentialError> {
        let invalid = |reason: String| CredentialError::InvalidDescriptor {
            path: descriptor.path.clone(),
            reason,
        };

        let raw = tokio::fs::read_to_string(&descriptor.path)
            .await
            .map_err(|e| invalid(e.to_string()))?;
        let trimmed = raw.trim();

        let secret = if trimmed.starts_with('{') {
            let file: DescriptorFile =
                serde_json::from_str(trimmed).map_err(|e| invalid(e.to_string()))?;
            match (file.api_key, file.access_token) {
                (Some(key), _) if !key.trim().is_empty() => Secret::ApiKey(key.trim().to_string()),
                (_, Some(token)) if !token.trim().is_empty() => {
                    Secret::AccessToken(token.trim().to_string())
                }
                _ if file.kind.as_deref() == Some("service_account") => {
                    return Err(invalid(
                        "service account keys must be exchanged for an access_token first".into(),
                    ));
                }
                _ => return Err(invalid("no api_key or access_token field".into())),
            }
        } else if trimmed.is_empty() {
            return Err(invalid("descriptor is empty".into()));
        } else {
            Secret::ApiKey(trimmed.to_string())
        };

        Ok(CredentialHandle::new(
            descriptor.ordinal,
            descriptor.label(),
            secret,
        ))
    }
}

/// One position in the pool
#[derive(Debug)]
pub struct CredentialSlot {
    /// Descriptor the slot was created from
    pub descriptor: CredentialDescriptor,
    /// Set once the slot was rotated away from or failed to authenticate
    pub exhausted: bool,
    handle: Option<CredentialHandle>,
}

impl CredentialSlot {
    /// Position in rotation order
    pub fn ordinal(&self) -> usize {
        self.descriptor.ordinal
    }
}

/// Ordered set of credentials with exactly one active slot
pub struct CredentialPool {
    slots: Vec<CredentialSlot>,
    active: Option<usize>,
    rotations: usize,
    authenticator: Arc<dyn Authenticator>,
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("slots", &self.slots)
            .field("active", &self.active)
            .field("rotations", &self.rotations)
            .finish()
    }
}

impl CredentialPool {
    /// List descriptor files in `dir`, sorted by file name
    ///
    /// Hidden files and sub-directories are ignored. A missing directory
    /// yields an empty list.
    pub fn discover(dir: &Path) -> Result<Vec<CredentialDescriptor>, CredentialError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir.display(), "Credential directory does not exist");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(CredentialError::Io {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CredentialError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_file() {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        Ok(paths
            .into_iter()
            .enumerate()
            .map(|(ordinal, path)| CredentialDescriptor { ordinal, path })
            .collect())
    }

    /// Build a pool from the descriptors in `dir`
    pub async fn from_dir(
        dir: &Path,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, CredentialError> {
        let descriptors = Self::discover(dir)?;
        tracing::info!(
            dir = %dir.display(),
            credentials = descriptors.len(),
            "Discovered credential descriptors"
        );
        Ok(Self::new(descriptors, authenticator).await)
    }

    /// Build a pool and activate the first descriptor that authenticates
    pub async fn new(
        descriptors: Vec<CredentialDescriptor>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let slots = descriptors
            .into_iter()
            .map(|descriptor| CredentialSlot {
                descriptor,
                exhausted: false,
                handle: None,
            })
            .collect();

        let mut pool = Self {
            slots,
            active: None,
            rotations: 0,
            authenticator,
        };
        pool.activate_from(0).await;
        pool
    }

    /// The active credential
    pub fn active(&self) -> Result<&CredentialHandle, CredentialError> {
        if self.slots.is_empty() {
            return Err(CredentialError::NoCredentialsConfigured);
        }
        match self.active.and_then(|idx| self.slots[idx].handle.as_ref()) {
            Some(handle) => Ok(handle),
            None if self.rotations > 0 => Err(CredentialError::CredentialsExhausted {
                tried: self.slots.len(),
            }),
            None => Err(CredentialError::NoCredentialsConfigured),
        }
    }

    /// Retire the active credential and activate the next usable one
    pub async fn rotate(&mut self) -> Result<&CredentialHandle, CredentialError> {
        if self.slots.is_empty() {
            return Err(CredentialError::NoCredentialsConfigured);
        }

        let Some(current) = self.active else {
            return Err(if self.rotations > 0 {
                CredentialError::CredentialsExhausted {
                    tried: self.slots.len(),
                }
            } else {
                CredentialError::NoCredentialsConfigured
            });
        };

        let slot = &mut self.slots[current];
        slot.exhausted = true;
        slot.handle = None;
        self.active = None;
        self.rotations += 1;

        self.activate_from(current + 1).await;

        match self.active {
            Some(next) => {
                tracing::info!(from = current, to = next, "Rotated to next credential");
                self.active()
            }
            None => {
                tracing::warn!(
                    credentials = self.slots.len(),
                    "No credential left to rotate to"
                );
                Err(CredentialError::CredentialsExhausted {
                    tried: self.slots.len(),
                })
            }
        }
    }

    /// Ordinal of the active credential
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Number of descriptors in the pool
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no descriptors
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots not yet exhausted, the active one included
    pub fn remaining(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.exhausted).count()
    }

    /// All slots in rotation order
    pub fn slots(&self) -> &[CredentialSlot] {
        &self.slots
    }

    async fn activate_from(&mut self, start: usize) {
        for idx in start..self.slots.len() {
            let descriptor = self.slots[idx].descriptor.clone();
            match self.authenticator.authenticate(&descriptor).await {
                Ok(handle) => {
                    tracing::debug!(ordinal = idx, label = %descriptor.label(), "Credential activated");
                    self.slots[idx].handle = Some(handle);
                    self.active = Some(idx);
                    return;
                }
                Err(e) => {
                    tracing::warn!(ordinal = idx, error = %e, "Skipping unusable credential");
                    self.slots[idx].exhausted = true;
                }
            }
        }
    }
}
