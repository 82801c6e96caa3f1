//! `HttpRemoteClient` against a loopback axum server.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use c2d::remote::{CREATE_GENERATE_TASK_PATH, SAVE_COPY_INFO_PATH};
use c2d::{AuthorizationPayload, CopyToDesignOptions, HttpRemoteClient, ImportMode, PlatformType, RemoteClient};
use c2d_protocol::{CreateGenerateTaskRequest, SaveCopyInfoRequest};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Seen {
	requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn save_copy_info(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
	seen.requests.lock().push((headers, body));
	Json(json!({"data": {"copyId": "abc123"}}))
}

async fn create_generate_task(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
	seen.requests.lock().push((headers, body));
	(StatusCode::OK, Json(json!({"error": {"message": "platform offline"}})))
}

async fn serve(router: Router) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let endpoint = format!("http://{}", listener.local_addr().unwrap());
	tokio::spawn(async move {
		axum::serve(listener, router).await.unwrap();
	});
	endpoint
}

fn client() -> HttpRemoteClient {
	let options = CopyToDesignOptions::builder(AuthorizationPayload::new("tok", "app"))
		.page_url("https://example.com/page")
		.visitor_id("visitor-7")
		.build();
	HttpRemoteClient::new(&options).unwrap()
}

#[tokio::test]
async fn save_copy_info_sends_credentials_and_unwraps_data() {
	let seen = Seen::default();
	let router = Router::new().route(SAVE_COPY_INFO_PATH, post(save_copy_info)).with_state(seen.clone());
	let endpoint = serve(router).await;

	let request = SaveCopyInfoRequest {
		secret: "s3cret".into(),
		platform: PlatformType::Figma,
		import_mode: ImportMode::Interactive,
	};
	let response = client().save_copy_info(&endpoint, &AuthorizationPayload::new("tok", "app"), &request).await.unwrap();
	assert_eq!(response.copy_id, "abc123");

	let requests = seen.requests.lock();
	let (headers, body) = &requests[0];
	assert_eq!(body, &json!({"secret": "s3cret", "platform": "figma", "importMode": "interactive"}));
	assert_eq!(headers["x-visitor-id"], "visitor-7");

	let authorization = headers["authorization"].to_str().unwrap();
	let decoded = STANDARD.decode(authorization.strip_prefix("Basic ").unwrap()).unwrap();
	let credentials: Value = serde_json::from_slice(&decoded).unwrap();
	assert_eq!(credentials, json!({"url": "https://example.com/page", "accessToken": "tok", "appId": "app"}));
}

#[tokio::test]
async fn error_envelope_fails_the_call() {
	let seen = Seen::default();
	let router = Router::new().route(CREATE_GENERATE_TASK_PATH, post(create_generate_task)).with_state(seen.clone());
	let endpoint = serve(router).await;

	let request = CreateGenerateTaskRequest {
		platform: PlatformType::Figma,
		content: "<refore-copy-to-design></refore-copy-to-design>".into(),
	};
	let err = client().create_generate_task(&endpoint, &AuthorizationPayload::new("tok", "app"), &request).await.unwrap_err();

	assert!(err.is_remote_failure());
	assert_eq!(err.to_string(), "create-generate-task request failed: platform offline");
	assert_eq!(seen.requests.lock().len(), 1);
}

#[tokio::test]
async fn http_error_status_fails_the_call() {
	let router = Router::new().route(SAVE_COPY_INFO_PATH, post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }));
	let endpoint = serve(router).await;

	let request = SaveCopyInfoRequest {
		secret: "s".into(),
		platform: PlatformType::MasterGo,
		import_mode: ImportMode::Quick,
	};
	let err = client().save_copy_info(&endpoint, &AuthorizationPayload::new("tok", "app"), &request).await.unwrap_err();
	assert_eq!(err.to_string(), "save-copy-info request failed: unexpected status 502 Bad Gateway");
}

#[tokio::test]
async fn unreachable_endpoint_is_a_remote_failure() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let endpoint = format!("http://{}", listener.local_addr().unwrap());
	drop(listener);

	let request = SaveCopyInfoRequest {
		secret: "s".into(),
		platform: PlatformType::Figma,
		import_mode: ImportMode::Interactive,
	};
	let err = client().save_copy_info(&endpoint, &AuthorizationPayload::new("tok", "app"), &request).await.unwrap_err();
	assert!(err.is_remote_failure());
}
