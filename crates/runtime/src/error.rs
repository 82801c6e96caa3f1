//! Error types for the channel runtime.

use std::time::Duration;

use c2d_protocol::{PacketError, ResourceKey};

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by channels, the connection pool and subscriptions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The realtime channel could not be opened or was refused by the server.
	#[error("failed to connect to {endpoint}: {message}")]
	Connect { endpoint: String, message: String },

	#[error("connecting to {endpoint} timed out after {timeout:?}")]
	ConnectTimeout { endpoint: String, timeout: Duration },

	#[error("invalid endpoint '{endpoint}': {reason}")]
	InvalidEndpoint { endpoint: String, reason: String },

	/// The channel closed before the operation completed.
	#[error("realtime channel closed")]
	ChannelClosed,

	/// A subscription under the same key is still waiting for its result.
	#[error("subscription {0} is already pending")]
	DuplicateSubscription(ResourceKey),

	/// The server settled the resource with `success: false`.
	#[error("resource {0} reported failure")]
	SubscriptionFailed(ResourceKey),

	#[error("protocol error: {0}")]
	Packet(#[from] PacketError),

	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn connect(endpoint: &str, message: impl ToString) -> Self {
		Error::Connect {
			endpoint: endpoint.to_string(),
			message: message.to_string(),
		}
	}

	/// Returns `true` for failures to establish a channel.
	pub fn is_connect_failure(&self) -> bool {
		matches!(self, Error::Connect { .. } | Error::ConnectTimeout { .. } | Error::InvalidEndpoint { .. } | Error::WebSocket(_))
	}
}
