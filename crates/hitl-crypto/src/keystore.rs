//! Durable keystore for the agent identity keypair.
//!
//! One JSON file per identity, readable only by the owning user. The parent
//! directory is created on first use with owner-only permissions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use hitl_types::errors::ProxyError;

use crate::keypair::AgentKeypair;

/// On-disk key file layout.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    public_key: String,
    private_key: String,
}

/// Loads and persists the identity keypair at a fixed path.
#[derive(Debug, Clone)]
pub struct Keystore {
    path: PathBuf,
}

impl Keystore {
    /// A keystore backed by the given key file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The key file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored keypair.
    ///
    /// Fails with [`ProxyError::KeypairNotFound`] if no file exists and
    /// [`ProxyError::KeypairCorrupt`] if the file cannot be parsed or a key
    /// fails validation.
    pub fn load(&self) -> Result<AgentKeypair, ProxyError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProxyError::KeypairNotFound(
                    self.path.display().to_string(),
                ));
            }
            Err(e) => return Err(ProxyError::Io(e.to_string())),
        };

        let file: KeyFile = serde_json::from_str(&raw)
            .map_err(|e| ProxyError::KeypairCorrupt(format!("invalid key file JSON: {e}")))?;

        AgentKeypair::from_encoded(&file.public_key, &file.private_key)
    }

    /// Persist a keypair, creating the parent directory if needed.
    ///
    /// The directory is restricted to the owner (0700) and the key file to
    /// owner read/write (0600).
    pub fn save(&self, keypair: &AgentKeypair) -> Result<(), ProxyError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
            restrict_permissions(parent, 0o700)?;
        }

        let file = KeyFile {
            public_key: keypair.public_key_b64(),
            private_key: keypair.private_key_b64(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        restrict_permissions(&self.path, 0o600)?;

        info!(path = %self.path.display(), "agent keypair saved");
        Ok(())
    }

    /// Load the stored keypair, generating and persisting a fresh one if
    /// none exists yet.
    ///
    /// Returns the keypair and whether it was created by this call, so the
    /// caller can register a newly generated public key with the backend
    /// (best-effort, outside this crate's concern).
    pub fn ensure(&self) -> Result<(AgentKeypair, bool), ProxyError> {
        match self.load() {
            Ok(keypair) => {
                info!("loaded existing agent keypair");
                Ok((keypair, false))
            }
            Err(ProxyError::KeypairNotFound(_)) => {
                info!("no agent keypair found, generating a new one");
                let keypair = AgentKeypair::generate();
                self.save(&keypair)?;
                Ok((keypair, true))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<(), ProxyError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), ProxyError> {
    // Windows ACLs are out of scope; the default user profile permissions apply.
    Ok(())
}
