//! Spliceforge - SCTE-35 ad signaling for live streams
//!
//! This library crate exposes the stateful half of spliceforge (scheduling,
//! ad decisioning and stream sessions) for the binary and integration tests.
//! The codec and manifest embedding live in `spliceforge-media`.

pub mod config;
pub mod scheduler;
pub mod session;
pub mod ssai;

pub use spliceforge_common as common;
pub use spliceforge_media as media;
