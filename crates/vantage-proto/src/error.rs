use thiserror::Error;

/// Error raised while decoding a host description.
///
/// Every variant except `Decode` is a protocol mismatch between host and
/// client: the message was well-formed JSON but names something this client
/// does not understand. Those are never defaulted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtoError {
    #[error("unknown coordinate space `{0}`")]
    UnknownSpace(String),

    #[error("unknown uniform type tag `{0}`")]
    UnknownUniformTag(String),

    #[error("malformed `{tag}` uniform: {reason}")]
    InvalidUniform { tag: String, reason: String },

    #[error("invalid texture descriptor: {0}")]
    InvalidTexture(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for ProtoError {
    fn from(err: serde_json::Error) -> Self {
        ProtoError::Decode(err.to_string())
    }
}
