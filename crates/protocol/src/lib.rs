//! Wire types for the copy-to-design service.
//!
//! This crate contains the serde-serializable types exchanged with the
//! coordination backend: the realtime resource events, the Engine.IO /
//! Socket.IO text packets that carry them, and the payload document that is
//! encrypted before it leaves the page.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond encoding/decoding
//! * 1:1 with the wire: Field names match what the backend sends
//! * Stable: Changes only when the wire protocol changes
//!
//! Connection management lives in `c2d-runtime`; delivery orchestration in
//! `copy-to-design`.

pub mod packet;
pub mod payload;
pub mod resource;
pub mod types;

pub use packet::*;
pub use payload::*;
pub use resource::*;
pub use types::*;
