//! Resource subscription messages carried over the realtime channel.
//!
//! Outbound:
//! ```json
//! ["resource:subscribe", { "resourceType": "copy-to-design:generate-task", "resourceId": "t-1" }]
//! ```
//!
//! Inbound (same event name, with a payload once the task settles):
//! ```json
//! ["resource:subscribe", {
//!   "resourceType": "copy-to-design:generate-task",
//!   "resourceId": "t-1",
//!   "payload": { "success": true, "content": "<div>..</div>" }
//! }]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name for subscribe requests and for settled-resource notifications.
pub const RESOURCE_SUBSCRIBE_EVENT: &str = "resource:subscribe";
/// Event name for unsubscribe requests.
pub const RESOURCE_UNSUBSCRIBE_EVENT: &str = "resource:unsubscribe";
/// Resource type under which generation tasks are published.
pub const GENERATE_TASK_RESOURCE: &str = "copy-to-design:generate-task";

/// Correlation key of a subscription: `(resourceType, resourceId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
	pub resource_type: String,
	pub resource_id: String,
}

impl ResourceKey {
	pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
		Self {
			resource_type: resource_type.into(),
			resource_id: resource_id.into(),
		}
	}

	/// Key for a generation task issued by the backend.
	pub fn generate_task(task_id: impl Into<String>) -> Self {
		Self::new(GENERATE_TASK_RESOURCE, task_id)
	}
}

impl fmt::Display for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.resource_type, self.resource_id)
	}
}

/// Body of an inbound `resource:subscribe` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEvent {
	pub resource_type: String,
	pub resource_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<ResourcePayload>,
}

impl ResourceEvent {
	pub fn key(&self) -> ResourceKey {
		ResourceKey::new(self.resource_type.clone(), self.resource_id.clone())
	}
}

/// Settlement payload of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePayload {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	/// Anything else the backend attaches.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, Value>,
}

impl ResourcePayload {
	pub fn succeeded(content: impl Into<String>) -> Self {
		Self {
			success: true,
			content: Some(content.into()),
			extra: serde_json::Map::new(),
		}
	}

	pub fn failed() -> Self {
		Self {
			success: false,
			content: None,
			extra: serde_json::Map::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn key_serializes_camel_case() {
		let key = ResourceKey::generate_task("t-1");
		assert_eq!(
			serde_json::to_value(&key).unwrap(),
			json!({"resourceType": "copy-to-design:generate-task", "resourceId": "t-1"})
		);
		assert_eq!(key.to_string(), "copy-to-design:generate-task:t-1");
	}

	#[test]
	fn event_without_payload() {
		let event: ResourceEvent = serde_json::from_value(json!({"resourceType": "a", "resourceId": "b"})).unwrap();
		assert!(event.payload.is_none());
		assert_eq!(event.key(), ResourceKey::new("a", "b"));
	}

	#[test]
	fn payload_keeps_extra_fields() {
		let event: ResourceEvent = serde_json::from_value(json!({
			"resourceType": "a",
			"resourceId": "b",
			"payload": {"success": true, "content": "<div>ok</div>", "elapsed": 12}
		}))
		.unwrap();
		let payload = event.payload.unwrap();
		assert!(payload.success);
		assert_eq!(payload.content.as_deref(), Some("<div>ok</div>"));
		assert_eq!(payload.extra["elapsed"], 12);
	}
}
