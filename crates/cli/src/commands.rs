use std::sync::Arc;

use anyhow::{Context, Result, bail};
use c2d::{AuthorizationPayload, CopyRequest, CopyToDesign, CopyToDesignOptions, ImportMode, WriteHooks, WriteOutcome, direct_platforms};
use tracing::{info, warn};

use crate::cli::{Cli, Commands, DeliverArgs};
use crate::sink::FileClipboard;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let (args, direct, import_mode) = match &cli.command {
		Commands::Interactive { args, quick } => (args, false, if *quick { ImportMode::Quick } else { ImportMode::Interactive }),
		Commands::Direct { args } => (args, true, ImportMode::Quick),
	};

	if direct && !args.platform.supports_direct() {
		let supported: Vec<String> = direct_platforms().map(|platform| platform.to_string()).collect();
		bail!("{} does not support direct delivery (supported: {})", args.platform, supported.join(", "));
	}

	let request = build_request(args, import_mode).await?;
	let sdk = CopyToDesign::new(build_options(&cli), Arc::new(FileClipboard::new(args.out.clone())))?;

	let hooks = WriteHooks::default().on_waiting_focus(|| info!(target = "c2d", "waiting for focus"));
	let result = if direct {
		sdk.copy_direct(&request, &hooks).await
	} else {
		sdk.copy_interactive(&request, &hooks).await
	};
	sdk.shutdown().await;

	match result.context("delivery failed")? {
		WriteOutcome::Written => {}
		// Running the command is the user action.
		WriteOutcome::UserActionRequired(pending) => pending.commit().await.context("deferred clipboard write failed")?,
	}
	Ok(())
}

fn build_options(cli: &Cli) -> CopyToDesignOptions {
	if cli.access_token.is_empty() {
		warn!(target = "c2d", "no access token given; set C2D_ACCESS_TOKEN");
	}

	let mut builder = CopyToDesignOptions::builder(AuthorizationPayload::new(&cli.access_token, &cli.app_id)).page_url(&cli.page_url);
	if let Some(region) = cli.region {
		builder = builder.region(region);
	}
	if let Some(endpoint) = &cli.endpoint {
		builder = builder.endpoint(endpoint);
	}
	builder.build()
}

async fn build_request(args: &DeliverArgs, import_mode: ImportMode) -> Result<CopyRequest> {
	let html = tokio::fs::read_to_string(&args.file).await.with_context(|| format!("failed to read {}", args.file.display()))?;

	let mut request = CopyRequest::new(html, args.platform).size(args.width, args.height).import_mode(import_mode);
	if let Some(name) = &args.top_layer_name {
		request = request.top_layer_name(name);
	}
	Ok(request)
}
