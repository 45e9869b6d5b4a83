//! Scene graph client for a remote plotting host.
//!
//! The host describes scenes, nested viewports and plots; this crate turns
//! those descriptions into backend resources, keeps them in step with the
//! host's updates, renders the tree, and answers picking queries.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`observable`] | `Observable<T>` and owned `Subscription`s |
//! | [`camera`] | camera inputs and every derived matrix |
//! | [`plot`] | plot synchronizer: geometry growth policy, uniforms, textures |
//! | [`scene`] / [`registry`] | scene nodes and the flat id maps that own them |
//! | [`render_loop`] | depth-first render pass and the throttled loop |
//! | [`picking`] | identity pass decoding and distance-ranked selection |
//! | [`bridge`] | window input to throttled host events |
//! | [`session`] | host message routing for one canvas |
//!
//! # Quick start
//!
//! ```rust
//! use vantage_engine::render::SoftBackend;
//! use vantage_proto::decode_message;
//! use vantage_scene::{RenderLoopConfig, Session};
//!
//! let mut backend = SoftBackend::new(64, 64);
//! let mut session = Session::new(RenderLoopConfig::default());
//! let msg = decode_message(
//!     r#"{"msg":"create_scene","scene":{"id":"root","viewport":[0,0,64,64]}}"#,
//! ).unwrap();
//! session.apply(&mut backend, msg).unwrap();
//! session.render_frame(&mut backend).unwrap();
//! ```

pub mod bridge;
pub mod camera;
mod error;
pub mod observable;
pub mod picking;
pub mod plot;
pub mod registry;
pub mod render_loop;
pub mod scene;
pub mod session;

pub use bridge::{BridgeConfig, CanvasMetrics, InputBridge};
pub use camera::{Camera, CameraMatrices};
pub use error::SceneError;
pub use observable::{Observable, Subscription};
pub use picking::{NativePick, PickCell};
pub use plot::{AttributeUpdate, Plot, PlotKind};
pub use registry::{Registry, Step};
pub use render_loop::{Canvas, ObjectTable, RenderLoop, RenderLoopConfig, Tick};
pub use scene::Scene;
pub use session::Session;
