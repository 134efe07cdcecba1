use clap::{Args, Parser, Subcommand};

use crate::auth::consent::DEFAULT_CALLBACK_PORT;
use crate::auth::endpoints::DEFAULT_API_BASE;
use crate::import::DEFAULT_FOLDER_STRUCTURE;
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "photosync",
    version,
    about = "Upload missing photos to Google Photos and import camera files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload photos under DIR whose filename is not yet in the library
    Sync(SyncArgs),
    /// Move camera files into a dated archive using their EXIF date
    Import(ImportArgs),
    /// Obtain and store an OAuth token pair, then exit
    Auth(AuthArgs),
    /// Show the last sync run and pending registrations
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding credentials, tokens and the ledger
    #[arg(long, global = true, env = "PHOTOSYNC_CONFIG_DIR", default_value = "~/.photosync")]
    pub config_dir: String,

    /// OAuth client credentials document [default: <config-dir>/credentials.json]
    #[arg(long, global = true)]
    pub credentials: Option<String>,

    /// Token file [default: <config-dir>/tokens.json]
    #[arg(long, global = true)]
    pub tokens: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Photos Library API base URL
    #[arg(long, global = true, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 120)]
    pub timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Local photo directory
    pub directory: String,

    /// Number of concurrent uploads
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Report what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// File extensions to consider (case-insensitive)
    #[arg(long = "extension", value_delimiter = ',', default_values = ["jpg", "jpeg"])]
    pub extensions: Vec<String>,

    /// Items per library listing page (max 100)
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub page_size: u32,

    /// Loopback port for the browser consent redirect
    #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT)]
    pub auth_port: u16,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Directory to scan for camera files
    pub input_dir: String,

    /// Archive root
    pub output_dir: String,

    /// Folder structure below the archive root (`none` for flat)
    #[arg(long, default_value = DEFAULT_FOLDER_STRUCTURE)]
    pub folder_structure: String,

    /// Report moves without performing them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    /// Loopback port for the browser consent redirect
    #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT)]
    pub auth_port: u16,
}
