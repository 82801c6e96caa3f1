use std::path::PathBuf;

use c2d::{PlatformType, Region};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "c2d")]
#[command(about = "Copy HTML into design tools")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Access token issued to the embedding application
	#[arg(long, global = true, env = "C2D_ACCESS_TOKEN", hide_env_values = true, default_value = "")]
	pub access_token: String,

	/// Application id
	#[arg(long, global = true, env = "C2D_APP_ID", default_value = "")]
	pub app_id: String,

	/// Backend endpoint, overriding region and platform defaults
	#[arg(long, global = true, env = "C2D_ENDPOINT")]
	pub endpoint: Option<String>,

	/// Region pinning the endpoint for every platform (china, world); defaults per platform
	#[arg(long, global = true, env = "C2D_REGION")]
	pub region: Option<Region>,

	/// Page URL reported to the backend
	#[arg(long, global = true, default_value = "")]
	pub page_url: String,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Put an encrypted marker on the clipboard for the design-tool plugin
	Interactive {
		#[command(flatten)]
		args: DeliverArgs,

		/// Ask the plugin to import without its interactive dialog
		#[arg(long)]
		quick: bool,
	},

	/// Convert on the server and write the result
	Direct {
		#[command(flatten)]
		args: DeliverArgs,
	},
}

#[derive(Args, Debug, Clone)]
pub struct DeliverArgs {
	/// HTML file to deliver
	pub file: PathBuf,

	/// Target design tool (figma, mastergo, jsdesign, pixso-china)
	#[arg(short, long, default_value = "figma")]
	pub platform: PlatformType,

	#[arg(long, default_value_t = c2d::payload::DEFAULT_WIDTH)]
	pub width: u32,

	#[arg(long, default_value_t = c2d::payload::DEFAULT_HEIGHT)]
	pub height: u32,

	/// Name of the top-level layer created in the design tool
	#[arg(long)]
	pub top_layer_name: Option<String>,

	/// Write the clipboard item here instead of stdout
	#[arg(short, long, value_name = "FILE")]
	pub out: Option<PathBuf>,
}
