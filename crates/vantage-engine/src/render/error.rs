use thiserror::Error;

use super::{GeometryId, MaterialId, TextureId};

/// Error raised by a graphics backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("unknown geometry {0:?}")]
    UnknownGeometry(GeometryId),

    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("unknown material {0:?}")]
    UnknownMaterial(MaterialId),

    #[error("geometry {geometry:?} has no attribute `{name}`")]
    UnknownAttribute { geometry: GeometryId, name: String },

    #[error("`{what}` expects at most {expected} values, got {got}")]
    DataLength { what: String, expected: usize, got: usize },

    #[error("no render target bound for this pass")]
    NoTarget,

    #[error("pixel readback failed: {0}")]
    Readback(String),

    #[error("program `{label}` rejected: {message}")]
    Program { label: String, message: String },

    #[error("unsupported: {0}")]
    Unsupported(String),
}
