use thiserror::Error;

use vantage_engine::render::BackendError;
use vantage_proto::{PlotId, ProtoError, SceneId};

/// Error raised while building or updating the scene graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("unknown scene `{0}`")]
    UnknownScene(SceneId),

    #[error("unknown plot `{0}`")]
    UnknownPlot(PlotId),

    #[error("id `{0}` is already registered")]
    DuplicateId(String),

    #[error("no root scene")]
    NoRootScene,

    #[error("plot `{plot}` has no uniform `{name}`")]
    UnknownUniform { plot: PlotId, name: String },

    #[error("plot `{plot}` has no attribute `{name}`")]
    UnknownAttribute { plot: PlotId, name: String },

    #[error("plot `{plot}` samples the shared atlas, but none is registered")]
    MissingAtlas { plot: PlotId },

    #[error("attribute `{name}` of plot `{plot}`: {reason}")]
    InvalidAttribute { plot: PlotId, name: String, reason: String },
}

impl SceneError {
    /// Host and client disagree on the protocol; retrying cannot help.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SceneError::Proto(_))
    }
}
