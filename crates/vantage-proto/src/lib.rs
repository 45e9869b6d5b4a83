//! Wire-level descriptions exchanged between the plotting host and the
//! vantage rendering client.
//!
//! This crate has no engine or GPU dependencies so host-side tooling can
//! build and validate messages without pulling in `wgpu` or `winit`.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`space`] | `Space`, `CoordinateSpace`, `PickingSpaces` |
//! | [`uniform`] | `UniformValue`, `TextureDescriptor` and texture enums |
//! | [`describe`] | `SceneDescription`, `PlotDescription`, `CameraDescription`, ids |
//! | [`message`] | `HostMessage`, `ClientEvent`, JSON line codec |
//! | [`error`] | `ProtoError` |
//!
//! # Quick start
//!
//! ```rust
//! use vantage_proto::{decode_message, HostMessage};
//!
//! let msg = decode_message(r#"{"msg":"set_plot_visible","plot":"p1","visible":false}"#).unwrap();
//! assert!(matches!(msg, HostMessage::SetPlotVisible { visible: false, .. }));
//! ```

pub mod describe;
pub mod error;
pub mod message;
pub mod space;
pub mod uniform;

pub use describe::{
    AttributeDescription, CameraDescription, PlotDescription, PlotId, SceneDescription, SceneId,
    ShaderSource,
};
pub use error::ProtoError;
pub use message::{
    decode_message, encode_event, ClientEvent, HostMessage, PickHit, PickMode, SceneUpdate,
};
pub use space::{CoordinateSpace, PickingSpaces, Space};
pub use uniform::{
    ElementType, FilterMode, SharedTexture, TextureDescriptor, TextureFormat, TextureSource,
    UniformValue, WrapMode,
};
