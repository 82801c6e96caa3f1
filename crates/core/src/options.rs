//! SDK configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use c2d_protocol::{PlatformType, Region};
use c2d_runtime::PoolConfig;

use crate::SDK_VERSION;
use crate::auth::AuthorizationProvider;

type EndpointFn = Arc<dyn Fn(PlatformType) -> String + Send + Sync>;

/// Configuration for [`CopyToDesign`](crate::CopyToDesign).
#[derive(Clone)]
pub struct CopyToDesignOptions {
	/// Pins every platform to one region. `None` uses each platform's home region.
	pub region: Option<Region>,
	pub authorization: Arc<dyn AuthorizationProvider>,
	/// Page URL reported to the backend with every request.
	pub page_url: String,
	/// Version written into the clipboard marker.
	pub sdk_version: String,
	/// Sent as `X-Visitor-Id` when set.
	pub visitor_id: Option<String>,
	pub pool: PoolConfig,
	endpoint: Option<EndpointFn>,
}

impl CopyToDesignOptions {
	pub fn builder(authorization: impl AuthorizationProvider + 'static) -> CopyToDesignOptionsBuilder {
		CopyToDesignOptionsBuilder::new(Arc::new(authorization))
	}

	/// Backend endpoint for `platform`: the override if set, then the
	/// configured region, then the platform's own default.
	pub fn endpoint_for(&self, platform: PlatformType) -> String {
		match (&self.endpoint, self.region) {
			(Some(resolve), _) => resolve(platform),
			(None, Some(region)) => region.default_endpoint().to_string(),
			(None, None) => platform.default_endpoint().to_string(),
		}
	}
}

impl fmt::Debug for CopyToDesignOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CopyToDesignOptions")
			.field("region", &self.region)
			.field("page_url", &self.page_url)
			.field("sdk_version", &self.sdk_version)
			.field("visitor_id", &self.visitor_id)
			.field("pool", &self.pool)
			.field("endpoint_override", &self.endpoint.is_some())
			.finish_non_exhaustive()
	}
}

/// Builder for [`CopyToDesignOptions`].
pub struct CopyToDesignOptionsBuilder {
	options: CopyToDesignOptions,
}

impl CopyToDesignOptionsBuilder {
	fn new(authorization: Arc<dyn AuthorizationProvider>) -> Self {
		Self {
			options: CopyToDesignOptions {
				region: None,
				authorization,
				page_url: String::new(),
				sdk_version: SDK_VERSION.to_string(),
				visitor_id: None,
				pool: PoolConfig::default(),
				endpoint: None,
			},
		}
	}

	pub fn region(mut self, region: Region) -> Self {
		self.options.region = Some(region);
		self
	}

	pub fn page_url(mut self, url: impl Into<String>) -> Self {
		self.options.page_url = url.into();
		self
	}

	pub fn sdk_version(mut self, version: impl Into<String>) -> Self {
		self.options.sdk_version = version.into();
		self
	}

	pub fn visitor_id(mut self, visitor_id: impl Into<String>) -> Self {
		self.options.visitor_id = Some(visitor_id.into());
		self
	}

	/// Uses the same endpoint for every platform.
	pub fn endpoint(self, endpoint: impl Into<String>) -> Self {
		let endpoint = endpoint.into();
		self.endpoint_fn(move |_| endpoint.clone())
	}

	/// Resolves endpoints per platform, overriding region and platform defaults.
	pub fn endpoint_fn(mut self, resolve: impl Fn(PlatformType) -> String + Send + Sync + 'static) -> Self {
		self.options.endpoint = Some(Arc::new(resolve));
		self
	}

	pub fn idle_grace(mut self, grace: Duration) -> Self {
		self.options.pool = self.options.pool.with_idle_grace(grace);
		self
	}

	pub fn connect_timeout(mut self, timeout: Duration) -> Self {
		self.options.pool = self.options.pool.with_connect_timeout(timeout);
		self
	}

	pub fn build(self) -> CopyToDesignOptions {
		self.options
	}
}
