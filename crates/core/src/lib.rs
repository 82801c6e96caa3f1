//! copy-to-design: hand rendered HTML to design tools through the clipboard.
//!
//! Two delivery modes are offered by [`CopyToDesign`]:
//!
//! - **Interactive** ([`CopyToDesign::copy_interactive`]): the payload is
//!   encrypted with a one-time secret, the secret is stored with the backend,
//!   and a marker element pointing at it is written to the clipboard. The
//!   design-tool plugin picks it up on paste.
//! - **Direct** ([`CopyToDesign::copy_direct`]): the backend converts the
//!   payload itself. The SDK submits a generation task, waits for its result
//!   over a pooled realtime channel, and writes the converted content to the
//!   clipboard.
//!
//! Clipboard access goes through a [`ClipboardPlatform`], which reports focus
//! and permission state and performs the write.
//!
//! # Example
//!
//! ```ignore
//! use c2d::{AuthorizationPayload, CopyRequest, CopyToDesign, CopyToDesignOptions, PlatformType, WriteHooks, WriteOutcome};
//!
//! let options = CopyToDesignOptions::builder(AuthorizationPayload::new("token", "app"))
//!     .page_url("https://example.com/report")
//!     .build();
//! let sdk = CopyToDesign::new(options, clipboard)?;
//!
//! let request = CopyRequest::new("<p>hi</p>", PlatformType::Figma).size(800, 600);
//! match sdk.copy_interactive(&request, &WriteHooks::default()).await? {
//!     WriteOutcome::Written => {}
//!     WriteOutcome::UserActionRequired(pending) => {
//!         // Call from a click handler.
//!         pending.commit().await?;
//!     }
//! }
//! ```

pub mod auth;
pub mod cipher;
pub mod clipboard;
pub mod delivery;
pub mod error;
pub mod marker;
pub mod options;
pub mod payload;
pub mod remote;
pub mod testing;

/// Version reported to the design-tool plugin in the clipboard marker.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use auth::{AuthorizationPayload, AuthorizationProvider};
pub use c2d_protocol::{HtmlContent, ImportMode, PlatformType, Region};
pub use c2d_runtime::{ConnectionPool, PoolConfig};
pub use cipher::{AesGcmCipher, Cipher};
pub use clipboard::{ClipboardItem, ClipboardPlatform, ClipboardWriter, PendingWrite, PermissionState, WriteHooks, WriteOutcome, WriteState};
pub use delivery::{CopyToDesign, DeliveryParts, direct_platforms};
pub use error::{Error, Result};
pub use marker::MarkerElement;
pub use options::{CopyToDesignOptions, CopyToDesignOptionsBuilder};
pub use payload::{CopyRequest, PayloadDescriptor};
pub use remote::{HttpRemoteClient, RemoteClient};
