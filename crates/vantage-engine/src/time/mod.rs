//! Time subsystem.
//!
//! Stable, testable throttles that never read the clock themselves: callers
//! pass `now` in, so tests can drive them with synthetic instants.
//!
//! - `FrameThrottle` gates rendering to a target frame rate
//! - `EventThrottle` rate-limits an outgoing event stream (leading edge +
//!   trailing latest value)

mod event_throttle;
mod frame_throttle;

pub use event_throttle::EventThrottle;
pub use frame_throttle::FrameThrottle;
