//! Realtime channel runtime for copy-to-design.
//!
//! This crate owns the long-lived parts of the delivery stack:
//! - [`ConnectionPool`]: one reference-counted realtime channel per endpoint,
//!   evicted after an idle grace period
//! - [`ResourceSubscriptions`]: `(resourceType, resourceId)` correlation of
//!   subscribe requests with their single settlement notification
//! - [`SocketIoConnector`]: Socket.IO over WebSocket channel implementation
//! - [`fake`]: in-memory connector for tests

pub mod channel;
pub mod error;
pub mod fake;
pub mod pool;
pub mod socket;
pub mod subscription;

pub use channel::{ChannelConnector, InboundEvent, InboundSender, RealtimeChannel};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, DEFAULT_IDLE_GRACE, PoolConfig, PooledConnection};
pub use socket::SocketIoConnector;
pub use subscription::{ResourceSubscriptions, ResourceWait};
