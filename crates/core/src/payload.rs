//! Delivery requests and the descriptor built from them.

use c2d_protocol::{HtmlContent, ImportMode, PayloadSource, PlatformType};
use serde_json::{Map, Value};

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;

const SOURCE_KIND_HTML: &str = "html";

/// What the caller wants delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyRequest {
	pub html: HtmlContent,
	pub platform: PlatformType,
	pub width: u32,
	pub height: u32,
	pub import_mode: ImportMode,
	/// Name for the top-level layer created in the design tool.
	pub top_layer_name: Option<String>,
	pub attributes: Map<String, Value>,
}

impl CopyRequest {
	pub fn new(html: impl Into<HtmlContent>, platform: PlatformType) -> Self {
		Self {
			html: html.into(),
			platform,
			width: DEFAULT_WIDTH,
			height: DEFAULT_HEIGHT,
			import_mode: ImportMode::default(),
			top_layer_name: None,
			attributes: Map::new(),
		}
	}

	pub fn size(mut self, width: u32, height: u32) -> Self {
		self.width = width;
		self.height = height;
		self
	}

	pub fn import_mode(mut self, mode: ImportMode) -> Self {
		self.import_mode = mode;
		self
	}

	pub fn top_layer_name(mut self, name: impl Into<String>) -> Self {
		self.top_layer_name = Some(name.into());
		self
	}

	/// Adds a custom attribute carried inside the encrypted payload.
	pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attributes.insert(key.into(), value.into());
		self
	}
}

/// Immutable payload built once per delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadDescriptor {
	source: PayloadSource,
}

impl PayloadDescriptor {
	/// Payload for plugin-side import, honoring the request's import mode.
	pub fn interactive(request: &CopyRequest) -> Self {
		Self::build(request, request.import_mode, false)
	}

	/// Payload for server-side import: quick mode, flagged as automated.
	pub fn direct(request: &CopyRequest) -> Self {
		Self::build(request, ImportMode::Quick, true)
	}

	fn build(request: &CopyRequest, import_mode: ImportMode, rpa: bool) -> Self {
		Self {
			source: PayloadSource {
				kind: SOURCE_KIND_HTML.to_string(),
				html: request.html.clone(),
				width: request.width,
				height: request.height,
				import_mode,
				top_layer_name: request.top_layer_name.clone(),
				rpa,
				attributes: request.attributes.clone(),
			},
		}
	}

	pub fn source(&self) -> &PayloadSource {
		&self.source
	}

	pub fn import_mode(&self) -> ImportMode {
		self.source.import_mode
	}

	pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
		serde_json::to_vec(&self.source)
	}
}
