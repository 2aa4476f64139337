//! Install identifier sources

use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Best-effort provider of an opaque per-install identifier
pub trait InstallIdSource: Send + Sync {
    fn install_id(&self) -> Option<String>;
}

/// Random UUIDv4 persisted to a file on first use
#[derive(Debug, Clone)]
pub struct FileInstallId {
    path: PathBuf,
}

impl FileInstallId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_existing(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let id = raw.trim();
        Uuid::parse_str(id).ok().map(|_| id.to_string())
    }

    fn create(&self) -> std::io::Result<String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let id = Uuid::new_v4().to_string();
        fs::write(&self.path, &id)?;
        log::info!("Created install id at {}", self.path.display());
        Ok(id)
    }
}

impl InstallIdSource for FileInstallId {
    fn install_id(&self) -> Option<String> {
        if let Some(id) = self.read_existing() {
            return Some(id);
        }
        match self.create() {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Install id unavailable at {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// Fixed identifier, or none
#[derive(Debug, Clone, Default)]
pub struct StaticInstallId(pub Option<String>);

impl InstallIdSource for StaticInstallId {
    fn install_id(&self) -> Option<String> {
        self.0.clone()
    }
}
