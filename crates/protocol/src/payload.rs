//! Payload document that is encrypted and handed to the design-tool plugin.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ImportMode;

/// HTML to export: a single document or several fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HtmlContent {
	Single(String),
	Many(Vec<String>),
}

impl From<&str> for HtmlContent {
	fn from(value: &str) -> Self {
		HtmlContent::Single(value.to_string())
	}
}

impl From<String> for HtmlContent {
	fn from(value: String) -> Self {
		HtmlContent::Single(value)
	}
}

impl From<Vec<String>> for HtmlContent {
	fn from(value: Vec<String>) -> Self {
		HtmlContent::Many(value)
	}
}

/// Plaintext document that gets encrypted:
///
/// ```json
/// {"type": "html", "html": "<p>hi</p>", "width": 800, "height": 600, "importMode": "interactive"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSource {
	#[serde(rename = "type")]
	pub kind: String,
	pub html: HtmlContent,
	pub width: u32,
	pub height: u32,
	pub import_mode: ImportMode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_layer_name: Option<String>,
	/// Set when the payload is submitted for automated (server-side) import.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub rpa: bool,
	/// Caller-supplied attributes passed through untouched.
	#[serde(flatten)]
	pub attributes: Map<String, Value>,
}

/// Request body for `save-copy-info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCopyInfoRequest {
	pub secret: String,
	pub platform: crate::types::PlatformType,
	pub import_mode: ImportMode,
}

/// Response body for `save-copy-info` after envelope unwrapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCopyInfoResponse {
	pub copy_id: String,
}

/// Request body for `create-generate-task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGenerateTaskRequest {
	pub platform: crate::types::PlatformType,
	/// Encoded marker element (outer HTML).
	pub content: String,
}

/// Response body for `create-generate-task` after envelope unwrapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGenerateTaskResponse {
	pub task_id: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn source_document_shape() {
		let source = PayloadSource {
			kind: "html".into(),
			html: "<p>hi</p>".into(),
			width: 800,
			height: 600,
			import_mode: ImportMode::Interactive,
			top_layer_name: None,
			rpa: false,
			attributes: Map::new(),
		};
		assert_eq!(
			serde_json::to_value(&source).unwrap(),
			json!({"type": "html", "html": "<p>hi</p>", "width": 800, "height": 600, "importMode": "interactive"})
		);
	}

	#[test]
	fn rpa_and_attributes_flatten() {
		let mut attributes = Map::new();
		attributes.insert("theme".into(), json!("dark"));
		let source = PayloadSource {
			kind: "html".into(),
			html: vec!["<a/>".to_string(), "<b/>".to_string()].into(),
			width: 1,
			height: 2,
			import_mode: ImportMode::Quick,
			top_layer_name: Some("Hero".into()),
			rpa: true,
			attributes,
		};
		let value = serde_json::to_value(&source).unwrap();
		assert_eq!(value["html"], json!(["<a/>", "<b/>"]));
		assert_eq!(value["rpa"], true);
		assert_eq!(value["theme"], "dark");
		assert_eq!(value["topLayerName"], "Hero");
		assert_eq!(value["importMode"], "quick");
	}

	#[test]
	fn response_bodies_are_camel_case() {
		let saved: SaveCopyInfoResponse = serde_json::from_value(json!({"copyId": "abc123"})).unwrap();
		assert_eq!(saved.copy_id, "abc123");
		let task: CreateGenerateTaskResponse = serde_json::from_value(json!({"taskId": "t-9"})).unwrap();
		assert_eq!(task.task_id, "t-9");
	}
}
