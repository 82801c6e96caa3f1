//! Clipboard marker element read by the design-tool plugin.
//!
//! ```html
//! <refore-copy-to-design data-copy-id="abc123" data-copy-version="0.4.0"
//!     data-copy-endpoint="https://api.demoway.com" data-copy-content="..."
//!     data-top-layer-name="&quot;Hero&quot;"></refore-copy-to-design>
//! ```

use crate::error::{Error, Result};

pub const MARKER_TAG: &str = "refore-copy-to-design";

const ATTR_COPY_ID: &str = "data-copy-id";
const ATTR_VERSION: &str = "data-copy-version";
const ATTR_ENDPOINT: &str = "data-copy-endpoint";
const ATTR_CONTENT: &str = "data-copy-content";
const ATTR_TOP_LAYER_NAME: &str = "data-top-layer-name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerElement {
	pub copy_id: String,
	pub version: String,
	pub endpoint: String,
	/// Encrypted payload.
	pub content: String,
	pub top_layer_name: Option<String>,
}

impl MarkerElement {
	/// Outer HTML of the element.
	pub fn to_html(&self) -> Result<String> {
		let mut html = format!("<{MARKER_TAG}");
		push_attr(&mut html, ATTR_COPY_ID, &self.copy_id);
		push_attr(&mut html, ATTR_VERSION, &self.version);
		push_attr(&mut html, ATTR_ENDPOINT, &self.endpoint);
		push_attr(&mut html, ATTR_CONTENT, &self.content);
		// JSON-encoded so the plugin can tell "no hint" (null) from an empty name.
		push_attr(&mut html, ATTR_TOP_LAYER_NAME, &serde_json::to_string(&self.top_layer_name)?);
		html.push_str(&format!("></{MARKER_TAG}>"));
		Ok(html)
	}

	/// Parses a marker previously produced by [`to_html`](Self::to_html).
	pub fn parse(html: &str) -> Result<Self> {
		let invalid = |reason: &str| Error::Config(format!("invalid marker element: {reason}"));

		let open = format!("<{MARKER_TAG}");
		let start = html.find(&open).ok_or_else(|| invalid("tag not found"))? + open.len();
		let end = html[start..].find('>').ok_or_else(|| invalid("unterminated tag"))? + start;
		let attrs = parse_attrs(&html[start..end]).ok_or_else(|| invalid("malformed attributes"))?;

		let get = |name: &str| attrs.iter().find(|(key, _)| key == name).map(|(_, value)| value.clone());
		let required = |name: &'static str| get(name).ok_or_else(|| invalid(&format!("missing {name}")));

		let top_layer_name = match get(ATTR_TOP_LAYER_NAME) {
			Some(raw) => serde_json::from_str(&raw)?,
			None => None,
		};

		Ok(Self {
			copy_id: required(ATTR_COPY_ID)?,
			version: get(ATTR_VERSION).unwrap_or_default(),
			endpoint: required(ATTR_ENDPOINT)?,
			content: required(ATTR_CONTENT)?,
			top_layer_name,
		})
	}
}

fn push_attr(html: &mut String, name: &str, value: &str) {
	html.push(' ');
	html.push_str(name);
	html.push_str("=\"");
	html.push_str(&escape(value));
	html.push('"');
}

fn escape(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for ch in value.chars() {
		match ch {
			'&' => out.push_str("&amp;"),
			'"' => out.push_str("&quot;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(ch),
		}
	}
	out
}

fn unescape(value: &str) -> String {
	value
		.replace("&quot;", "\"")
		.replace("&lt;", "<")
		.replace("&gt;", ">")
		.replace("&#39;", "'")
		.replace("&amp;", "&")
}

fn parse_attrs(mut rest: &str) -> Option<Vec<(String, String)>> {
	let mut attrs = Vec::new();
	loop {
		rest = rest.trim_start();
		if rest.is_empty() || rest == "/" {
			return Some(attrs);
		}
		let eq = rest.find('=')?;
		let name = rest[..eq].trim().to_string();
		let after = rest[eq + 1..].trim_start();
		let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
		let close = after[1..].find(quote)? + 1;
		attrs.push((name, unescape(&after[1..close])));
		rest = &after[close + 1..];
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn marker() -> MarkerElement {
		MarkerElement {
			copy_id: "abc123".into(),
			version: "0.4.0".into(),
			endpoint: "https://api.demoway.com".into(),
			content: "U2FsdGVk+/==".into(),
			top_layer_name: Some("Hero \"banner\"".into()),
		}
	}

	#[test]
	fn test_marker_html_shape() {
		let html = marker().to_html().unwrap();
		assert!(html.starts_with("<refore-copy-to-design data-copy-id=\"abc123\""));
		assert!(html.contains("data-copy-endpoint=\"https://api.demoway.com\""));
		assert!(html.contains("data-top-layer-name=\"&quot;Hero \\&quot;banner\\&quot;&quot;\""));
		assert!(html.ends_with("></refore-copy-to-design>"));
	}

	#[test]
	fn test_marker_parse_recovers_fields() {
		let original = marker();
		assert_eq!(MarkerElement::parse(&original.to_html().unwrap()).unwrap(), original);

		let no_hint = MarkerElement { top_layer_name: None, ..marker() };
		let html = no_hint.to_html().unwrap();
		assert!(html.contains("data-top-layer-name=\"null\""));
		assert_eq!(MarkerElement::parse(&html).unwrap().top_layer_name, None);
	}

	#[test]
	fn test_marker_parse_rejects_foreign_html() {
		assert!(MarkerElement::parse("<div>hello</div>").is_err());
		assert!(MarkerElement::parse("<refore-copy-to-design data-copy-id=\"x\"></refore-copy-to-design>").is_err());
	}
}
