//! Error types for copy-to-design.

use c2d_protocol::{PlatformType, ResourceKey};

/// Result alias for copy-to-design operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a delivery.
///
/// Nothing here is retried internally; callers retry by running the whole
/// delivery again.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The realtime channel could not be opened.
	#[error("realtime connection failed: {0}")]
	Connection(#[source] c2d_runtime::Error),

	/// The backend reported that the generation task failed.
	#[error("generation task {task_id} failed")]
	SubscriptionFailed { task_id: String },

	/// The generation task succeeded without returning content.
	#[error("generation task {task_id} returned no content")]
	EmptyResult { task_id: String },

	/// The realtime channel went away before the task settled.
	#[error("realtime channel closed before the task settled")]
	ChannelClosed,

	#[error("subscription {0} is already pending")]
	DuplicateSubscription(ResourceKey),

	/// The platform refused clipboard access outright.
	#[error("clipboard write permission denied")]
	PermissionDenied,

	/// The platform rejected the clipboard write.
	#[error("clipboard write failed: {0}")]
	WriteFailed(String),

	/// A backend request failed or returned an error envelope.
	#[error("{operation} request failed: {message}")]
	RemoteCall { operation: &'static str, message: String },

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("platform {0} does not support direct delivery")]
	UnsupportedPlatform(PlatformType),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn remote(operation: &'static str, message: impl ToString) -> Self {
		Error::RemoteCall {
			operation,
			message: message.to_string(),
		}
	}

	pub fn is_permission_denied(&self) -> bool {
		matches!(self, Error::PermissionDenied)
	}

	pub fn is_subscription_failure(&self) -> bool {
		matches!(self, Error::SubscriptionFailed { .. })
	}

	pub fn is_remote_failure(&self) -> bool {
		matches!(self, Error::RemoteCall { .. })
	}
}

impl From<c2d_runtime::Error> for Error {
	fn from(err: c2d_runtime::Error) -> Self {
		match err {
			c2d_runtime::Error::SubscriptionFailed(key) => Error::SubscriptionFailed { task_id: key.resource_id },
			c2d_runtime::Error::DuplicateSubscription(key) => Error::DuplicateSubscription(key),
			c2d_runtime::Error::ChannelClosed => Error::ChannelClosed,
			other => Error::Connection(other),
		}
	}
}
