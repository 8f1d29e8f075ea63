//! On-disk world directories and their metadata
//!
//! Each world lives in `<root>/<name>/` with a `world.meta` RON file next to
//! whatever the host stores there. The core only ever creates, inspects and
//! deletes whole directories.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::host::{Difficulty, Dimension, WorldSettings};

const METADATA_FILE: &str = "world.meta";
const METADATA_VERSION: u32 = 1;

/// World metadata stored in world.meta (RON format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub version: u32,
    pub seed: u64,
    #[serde(default)]
    pub dimension: Dimension,
    pub spawn_point: (i32, i32, i32),
    pub created_at: String,
    #[serde(default = "default_structures")]
    pub generate_structures: bool,
    #[serde(default)]
    pub difficulty: Difficulty,
}

fn default_structures() -> bool {
    true
}

impl WorldMetadata {
    /// Metadata for a freshly created world
    pub fn new(settings: &WorldSettings, spawn_point: (i32, i32, i32)) -> Self {
        Self {
            version: METADATA_VERSION,
            seed: settings.seed,
            dimension: settings.dimension,
            spawn_point,
            created_at: chrono::Local::now().to_rfc3339(),
            generate_structures: settings.generate_structures,
            difficulty: settings.difficulty,
        }
    }
}

/// Directory-level world storage
pub trait WorldStorage: Send + Sync {
    /// Directory a world lives in (whether or not it exists)
    fn world_dir(&self, name: &str) -> PathBuf;

    fn exists(&self, name: &str) -> bool {
        self.world_dir(name).is_dir()
    }

    /// Create the world directory if missing
    fn create_world_dir(&self, name: &str) -> Result<PathBuf, StorageError>;

    /// Remove a world directory recursively. `Ok(false)` if there was nothing to delete.
    fn delete_world(&self, name: &str) -> Result<bool, StorageError>;

    fn read_metadata(&self, name: &str) -> Result<Option<WorldMetadata>, StorageError>;

    fn write_metadata(&self, name: &str, meta: &WorldMetadata) -> Result<(), StorageError>;

    /// Names of every world directory, sorted
    fn list_worlds(&self) -> Result<Vec<String>, StorageError>;
}

/// World storage rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsWorldStorage {
    root: PathBuf,
}

impl FsWorldStorage {
    /// Create a storage rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.world_dir(name).join(METADATA_FILE)
    }
}

impl WorldStorage for FsWorldStorage {
    fn world_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn create_world_dir(&self, name: &str) -> Result<PathBuf, StorageError> {
        let dir = self.world_dir(name);
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(dir)
    }

    fn delete_world(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self.world_dir(name);
        if !dir.exists() {
            log::debug!("[STORE] World '{}' has no directory, nothing to delete", name);
            return Ok(false);
        }

        std::fs::remove_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        log::info!("[STORE] Deleted world directory {:?}", dir);
        Ok(true)
    }

    fn read_metadata(&self, name: &str) -> Result<Option<WorldMetadata>, StorageError> {
        let path = self.metadata_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
        ron::from_str(&contents)
            .map(Some)
            .map_err(|e| StorageError::Metadata {
                path,
                message: e.to_string(),
            })
    }

    fn write_metadata(&self, name: &str, meta: &WorldMetadata) -> Result<(), StorageError> {
        self.create_world_dir(name)?;
        let path = self.metadata_path(name);
        let serialized = ron::ser::to_string_pretty(meta, Default::default()).map_err(|e| {
            StorageError::Metadata {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, serialized).map_err(|e| StorageError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &path).map_err(|e| StorageError::io(&path, e))?;
        Ok(())
    }

    fn list_worlds(&self) -> Result<Vec<String>, StorageError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
