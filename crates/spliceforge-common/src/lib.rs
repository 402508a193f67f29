//! Spliceforge-Common: shared ad-signaling types and the event bus.
//!
//! This crate provides the vocabulary every other spliceforge crate speaks:
//!
//! - **Markers**: [`AdMarker`], [`AdType`] and the [`MarkerState`] lifecycle
//! - **Ad decisioning**: [`AdBreakRequest`], [`ViewerContext`], [`AdDecision`]
//! - **Events**: [`EventBus`], the outbound queue consumed by the transport
//!
//! # Examples
//!
//! ```
//! use spliceforge_common::{AdMarker, AdType, MarkerState};
//!
//! let marker = AdMarker::new("m-1", "cue-1", 10.0, 30.0, AdType::ProviderAd);
//! assert_eq!(marker.state, MarkerState::Pending);
//! assert!(marker.is_due(10.0));
//! assert!(!marker.is_due(9.999));
//! ```

pub mod ad;
pub mod events;
pub mod types;

pub use ad::*;
pub use events::{Event, EventBus, SignalEvent};
pub use types::*;
