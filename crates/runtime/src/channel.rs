//! Realtime channel abstraction.
//!
//! A channel is an authenticated, bidirectional event stream to one endpoint.
//! Outbound events go through [`RealtimeChannel::emit`]; inbound events are
//! pushed into the [`InboundSender`] handed to [`ChannelConnector::connect`].
//! The sender exists before the connect handshake starts, so no event the
//! server sends after acknowledging the connection can be missed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Event received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
	pub name: String,
	pub data: Value,
}

impl InboundEvent {
	pub fn new(name: impl Into<String>, data: Value) -> Self {
		Self { name: name.into(), data }
	}
}

/// Sink for inbound events of one channel.
pub type InboundSender = mpsc::UnboundedSender<InboundEvent>;

/// Open channel to one endpoint.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
	/// Sends an event with a single JSON argument.
	async fn emit(&self, event: &str, data: Value) -> Result<()>;

	/// Whether the channel still considers itself connected.
	fn is_connected(&self) -> bool;

	/// Closes the channel. Closing twice is a no-op.
	async fn close(&self);
}

/// Opens realtime channels.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
	/// Opens a channel to `endpoint`, authenticating with `auth`, and resolves
	/// once the server acknowledged the connection.
	async fn connect(&self, endpoint: &str, auth: &Value, inbound: InboundSender) -> Result<Arc<dyn RealtimeChannel>>;
}
