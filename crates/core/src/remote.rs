//! Backend HTTP calls.
//!
//! Responses use an envelope: a truthy top-level `error` fails the call, and
//! a top-level `data` field is unwrapped before decoding.

use std::time::Duration;

use async_trait::async_trait;
use c2d_protocol::{CreateGenerateTaskRequest, CreateGenerateTaskResponse, SaveCopyInfoRequest, SaveCopyInfoResponse};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthorizationPayload;
use crate::error::{Error, Result};
use crate::options::CopyToDesignOptions;

pub const SAVE_COPY_INFO_PATH: &str = "/api/refore/copy-to-design/save-copy-info";
pub const CREATE_GENERATE_TASK_PATH: &str = "/api/refore/copy-to-design/create-generate-task";

const VISITOR_ID_HEADER: &str = "X-Visitor-Id";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The two backend calls a delivery makes.
#[async_trait]
pub trait RemoteClient: Send + Sync {
	/// Stores the one-time secret and returns the copy id.
	async fn save_copy_info(&self, endpoint: &str, auth: &AuthorizationPayload, request: &SaveCopyInfoRequest) -> Result<SaveCopyInfoResponse>;

	/// Submits a server-side generation task and returns its id.
	async fn create_generate_task(
		&self,
		endpoint: &str,
		auth: &AuthorizationPayload,
		request: &CreateGenerateTaskRequest,
	) -> Result<CreateGenerateTaskResponse>;
}

/// [`RemoteClient`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
	client: reqwest::Client,
	page_url: String,
	visitor_id: Option<String>,
}

impl HttpRemoteClient {
	pub fn new(options: &CopyToDesignOptions) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(DEFAULT_REQUEST_TIMEOUT)
			.build()
			.map_err(|err| Error::Config(format!("failed to create HTTP client: {err}")))?;
		Ok(Self::with_client(client, options))
	}

	/// Wraps an existing client, e.g. one with custom TLS roots or a proxy.
	pub fn with_client(client: reqwest::Client, options: &CopyToDesignOptions) -> Self {
		Self {
			client,
			page_url: options.page_url.clone(),
			visitor_id: options.visitor_id.clone(),
		}
	}

	async fn post<B, T>(&self, operation: &'static str, endpoint: &str, path: &str, auth: &AuthorizationPayload, body: &B) -> Result<T>
	where
		B: Serialize + Sync,
		T: DeserializeOwned,
	{
		let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
		debug!(target = "c2d.remote", operation, %url, "request");

		let mut request = self.client.post(&url).header(AUTHORIZATION, auth.authorization_header(&self.page_url)?).json(body);
		if let Some(visitor_id) = &self.visitor_id {
			request = request.header(VISITOR_ID_HEADER, visitor_id);
		}

		let response = request.send().await.map_err(|err| {
			warn!(target = "c2d.remote", operation, %url, error = %err, "request failed");
			Error::remote(operation, err)
		})?;
		let status = response.status();
		let text = response.text().await.map_err(|err| Error::remote(operation, err))?;

		let value = if text.trim().is_empty() {
			Value::Null
		} else {
			match serde_json::from_str::<Value>(&text) {
				Ok(value) => value,
				Err(_) if !status.is_success() => return Err(Error::remote(operation, format!("unexpected status {status}"))),
				Err(err) => return Err(Error::remote(operation, format!("invalid response body: {err}"))),
			}
		};

		let data = unwrap_envelope(operation, value)?;
		if !status.is_success() {
			return Err(Error::remote(operation, format!("unexpected status {status}")));
		}
		serde_json::from_value(data).map_err(|err| Error::remote(operation, format!("invalid response body: {err}")))
	}
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
	async fn save_copy_info(&self, endpoint: &str, auth: &AuthorizationPayload, request: &SaveCopyInfoRequest) -> Result<SaveCopyInfoResponse> {
		self.post("save-copy-info", endpoint, SAVE_COPY_INFO_PATH, auth, request).await
	}

	async fn create_generate_task(
		&self,
		endpoint: &str,
		auth: &AuthorizationPayload,
		request: &CreateGenerateTaskRequest,
	) -> Result<CreateGenerateTaskResponse> {
		self.post("create-generate-task", endpoint, CREATE_GENERATE_TASK_PATH, auth, request).await
	}
}

/// Applies the response envelope convention.
pub fn unwrap_envelope(operation: &'static str, value: Value) -> Result<Value> {
	let Value::Object(mut map) = value else {
		return Ok(value);
	};

	if let Some(error) = map.get("error").filter(|error| is_truthy(error)) {
		return Err(Error::remote(operation, error_message(error)));
	}
	match map.remove("data") {
		Some(data) => Ok(data),
		None => Ok(Value::Object(map)),
	}
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(flag) => *flag,
		Value::String(text) => !text.is_empty(),
		Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
		Value::Array(_) | Value::Object(_) => true,
	}
}

fn error_message(error: &Value) -> String {
	match error {
		Value::String(message) => message.clone(),
		Value::Object(map) => map.get("message").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| error.to_string()),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_envelope_unwraps_data() {
		let value = unwrap_envelope("op", json!({"data": {"copyId": "abc"}})).unwrap();
		assert_eq!(value, json!({"copyId": "abc"}));
	}

	#[test]
	fn test_envelope_passes_bare_bodies() {
		assert_eq!(unwrap_envelope("op", json!({"taskId": "t"})).unwrap(), json!({"taskId": "t"}));
		assert_eq!(unwrap_envelope("op", json!("x")).unwrap(), json!("x"));
	}

	#[test]
	fn test_envelope_error_short_circuits() {
		let err = unwrap_envelope("save-copy-info", json!({"error": {"message": "quota exceeded"}, "data": {}})).unwrap_err();
		assert!(err.is_remote_failure());
		assert_eq!(err.to_string(), "save-copy-info request failed: quota exceeded");

		let err = unwrap_envelope("op", json!({"error": "nope"})).unwrap_err();
		assert_eq!(err.to_string(), "op request failed: nope");
	}

	#[test]
	fn test_envelope_ignores_falsy_error() {
		assert_eq!(unwrap_envelope("op", json!({"error": null, "data": 1})).unwrap(), json!(1));
		assert_eq!(unwrap_envelope("op", json!({"error": false, "data": 2})).unwrap(), json!(2));
	}
}
