use thiserror::Error;

use super::config::ConfigError;
use crate::core::cubature::CubatureError;
use crate::core::geometry::GeometryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Cubature error: {0}")]
    Cubature(#[from] CubatureError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Singular matrix while building the Rytov matrix of object {object} at omega={omega}")]
    SingularMatrix { omega: f64, object: usize },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
