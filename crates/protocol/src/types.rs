//! Platform, region and import-mode identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Design tool that will receive the pasted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformType {
	#[serde(rename = "figma")]
	Figma,
	#[serde(rename = "mastergo")]
	MasterGo,
	#[serde(rename = "jsdesign")]
	JsDesign,
	#[serde(rename = "pixso-china")]
	PixsoChina,
}

impl PlatformType {
	pub const ALL: [PlatformType; 4] = [PlatformType::Figma, PlatformType::MasterGo, PlatformType::JsDesign, PlatformType::PixsoChina];

	/// Wire name of the platform.
	pub fn as_str(self) -> &'static str {
		match self {
			PlatformType::Figma => "figma",
			PlatformType::MasterGo => "mastergo",
			PlatformType::JsDesign => "jsdesign",
			PlatformType::PixsoChina => "pixso-china",
		}
	}

	/// Whether the backend can transform content for this platform while the
	/// caller waits (the "direct" delivery mode).
	pub fn supports_direct(self) -> bool {
		matches!(self, PlatformType::Figma)
	}

	/// Region whose backend serves this platform when none is configured.
	pub fn home_region(self) -> Region {
		match self {
			PlatformType::Figma => Region::World,
			PlatformType::MasterGo | PlatformType::JsDesign | PlatformType::PixsoChina => Region::China,
		}
	}

	/// API endpoint used for this platform when no region or override is set.
	pub fn default_endpoint(self) -> &'static str {
		self.home_region().default_endpoint()
	}
}

impl fmt::Display for PlatformType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PlatformType {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		PlatformType::ALL
			.into_iter()
			.find(|platform| platform.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| UnknownVariant::new("platform", s))
	}
}

/// Deployment region; selects the default backend endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
	China,
	#[default]
	World,
}

impl Region {
	/// Default API endpoint for the region.
	pub fn default_endpoint(self) -> &'static str {
		match self {
			Region::China => "https://api.demoway.cn",
			Region::World => "https://api.demoway.com",
		}
	}
}

impl fmt::Display for Region {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Region::China => f.write_str("China"),
			Region::World => f.write_str("World"),
		}
	}
}

impl FromStr for Region {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"china" | "cn" => Ok(Region::China),
			"world" | "global" => Ok(Region::World),
			_ => Err(UnknownVariant::new("region", s)),
		}
	}
}

/// How the design-tool plugin should import the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
	Quick,
	#[default]
	Interactive,
}

impl ImportMode {
	pub fn as_str(self) -> &'static str {
		match self {
			ImportMode::Quick => "quick",
			ImportMode::Interactive => "interactive",
		}
	}
}

impl fmt::Display for ImportMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown platform or region name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
	kind: &'static str,
	value: String,
}

impl UnknownVariant {
	fn new(kind: &'static str, value: &str) -> Self {
		Self { kind, value: value.to_string() }
	}
}
