//! Credentials sent to the backend.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;

/// Credentials identifying the embedding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPayload {
	pub access_token: String,
	pub app_id: String,
	/// Extra fields forwarded verbatim.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl AuthorizationPayload {
	pub fn new(access_token: impl Into<String>, app_id: impl Into<String>) -> Self {
		Self {
			access_token: access_token.into(),
			app_id: app_id.into(),
			extra: Map::new(),
		}
	}

	/// Adds an extra field to the payload.
	pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extra.insert(key.into(), value.into());
		self
	}

	/// Value of the `Authorization` header: `Basic base64(JSON{url, ...payload})`.
	pub fn authorization_header(&self, page_url: &str) -> Result<String> {
		let mut body = self.to_object()?;
		body.insert("url".to_string(), Value::String(page_url.to_string()));
		let encoded = STANDARD.encode(serde_json::to_vec(&Value::Object(body))?);
		Ok(format!("Basic {encoded}"))
	}

	/// Auth payload sent with the realtime channel's CONNECT packet.
	pub fn socket_auth(&self, page_url: &str) -> Result<Value> {
		let mut body = self.to_object()?;
		body.insert("type".to_string(), json!("sdk"));
		body.insert("url".to_string(), Value::String(page_url.to_string()));
		Ok(Value::Object(body))
	}

	fn to_object(&self) -> Result<Map<String, Value>> {
		match serde_json::to_value(self)? {
			Value::Object(map) => Ok(map),
			_ => Ok(Map::new()),
		}
	}
}

/// Supplies credentials for each delivery.
///
/// Called once per delivery, so implementations can refresh short-lived
/// tokens.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
	async fn authorization(&self) -> Result<AuthorizationPayload>;
}

#[async_trait]
impl AuthorizationProvider for AuthorizationPayload {
	async fn authorization(&self) -> Result<AuthorizationPayload> {
		Ok(self.clone())
	}
}
