//! Error types for resets, pool rotation, storage and scheduling

use std::path::PathBuf;

use thiserror::Error;

use crate::reset::ResetPhase;

/// Why a reset was rejected or why an accepted reset ended in `Aborted`
#[derive(Debug, Error)]
pub enum ResetError {
    /// A reset was requested while another one was still running
    #[error("a world reset is already in progress")]
    AlreadyInProgress,

    /// Deleting a world directory failed; later directories were left untouched
    #[error("failed to delete world '{world}'")]
    TeardownIo {
        world: String,
        #[source]
        source: StorageError,
    },

    /// The host returned no usable world
    #[error("host could not create world '{world}'")]
    WorldCreation { world: String },

    /// The session was dropped mid-reset (a phase panicked or its task was discarded)
    #[error("reset session lost during the '{phase}' phase")]
    PhasePanicked { phase: ResetPhase },

    /// A phase tried to move the session somewhere other than its successor
    #[error("invalid reset transition {from} -> {to}")]
    InvalidTransition { from: ResetPhase, to: ResetPhase },

    /// Pool rotation failed (rotating strategy only)
    #[error("world rotation failed")]
    Rotation(#[from] PoolError),
}

/// Failures of the world pool manager
#[derive(Debug, Error)]
pub enum PoolError {
    /// The host could neither load nor create the slot's world
    #[error("pool slot '{slot}' could not be loaded or created")]
    WorldUnavailable { slot: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Recoverable configuration problems recorded by the pool manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolWarning {
    /// Fewer than two slots cannot rotate; the size was replaced
    SizeTooSmall { requested: usize, coerced: usize },
    /// Accepted, but every slot costs a full world on disk
    SizeLarge { requested: usize },
}

impl std::fmt::Display for PoolWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolWarning::SizeTooSmall { requested, coerced } => write!(
                f,
                "pool size {} is too small to rotate, using {}",
                requested, coerced
            ),
            PoolWarning::SizeLarge { requested } => write!(
                f,
                "pool size {} exceeds the recommended maximum of {}",
                requested,
                crate::config::MAX_RECOMMENDED_POOL_SIZE
            ),
        }
    }
}

/// Filesystem and metadata failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed world metadata at {path}: {message}")]
    Metadata { path: PathBuf, message: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures while starting a scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to build async worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn tick thread '{name}'")]
    Thread {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A chunk load that the host could not satisfy
#[derive(Debug, Clone, Error)]
#[error("chunk load failed: {0}")]
pub struct ChunkLoadError(pub String);
