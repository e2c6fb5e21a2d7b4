use crate::Coords;
use thiserror::Error;

/// Everything that can go wrong while setting up or running a model. Spatial
/// exhaustion is not in here: a village that runs out of land deals with that
/// itself.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("cannot found {breed} at {coords:?}: {reason}")]
    FoundingFailed {
        breed: String,
        coords: Coords,
        reason: &'static str,
    },
    #[error("layer `{name}` has {found} cells, expected {expected}")]
    LayerShape {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("no layer named `{0}` in the landscape")]
    UnknownLayer(String),
    #[error("simulation exceeded its time budget after {elapsed:?}")]
    EvaluationTimeout { elapsed: std::time::Duration },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for rejecting a configuration value.
pub(crate) fn invalid<T>(name: &'static str, reason: impl Into<String>) -> Result<T> {
    Err(Error::InvalidParameter {
        name,
        reason: reason.into(),
    })
}
