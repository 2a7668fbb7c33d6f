//! Artifact store on the local filesystem
//!
//! Artifacts live under a root directory at their destination key. Uploads
//! are atomic: bytes go to a sibling `.tmp` file that is renamed into place.

use crate::core::course::ArtifactLocation;
use crate::core::error::AdapterError;
use crate::core::traits::ArtifactStore;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `destination` under the root, refusing keys that escape it
    fn resolve(&self, destination: &str) -> Result<PathBuf, AdapterError> {
        let relative = Path::new(destination);
        if !is_plain_relative(relative) {
            return Err(AdapterError::Permanent(format!(
                "invalid artifact destination: {destination}"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Whether `path` names a file strictly below the root
    fn holds(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root).is_ok_and(is_plain_relative)
    }
}

/// Non-empty and made of normal components only, so no `..`, root or prefix
fn is_plain_relative(path: &Path) -> bool {
    let mut components = path.components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn remove_if_present(path: &Path) -> Result<(), AdapterError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, destination: &str) -> Result<ArtifactLocation, AdapterError> {
        let path = self.resolve(destination)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = temp_path(&path);
        fs::write(&temp, &bytes).await?;
        fs::rename(&temp, &path).await?;

        debug!(path = %path.display(), size = bytes.len(), "artifact written");
        Ok(ArtifactLocation::new(path.display().to_string()))
    }

    async fn delete(&self, location: &ArtifactLocation) -> Result<(), AdapterError> {
        let path = PathBuf::from(location.as_str());
        if !self.holds(&path) {
            return Err(AdapterError::Permanent(format!(
                "{location} is outside the artifact root"
            )));
        }

        remove_if_present(&temp_path(&path)).await?;
        remove_if_present(&path).await
    }

    fn locate(&self, destination: &str) -> ArtifactLocation {
        ArtifactLocation::new(self.root.join(destination).display().to_string())
    }
}
