use std::path::PathBuf;
use std::time::Duration;

use crate::auth::endpoints::Endpoints;
use crate::cli::{GlobalArgs, SyncArgs};
use crate::types::LogLevel;
use crate::upload::UploadConfig;

/// Application configuration shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub credentials_path: PathBuf,
    pub tokens_path: PathBuf,
    pub db_path: PathBuf,
    pub endpoints: Endpoints,
    pub http_timeout: Duration,
    #[allow(dead_code)] // Read from cli.global.log_level before Config exists
    pub log_level: LogLevel,
    pub no_progress_bar: bool,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: &GlobalArgs) -> anyhow::Result<Self> {
        let config_dir = expand_tilde(&cli.config_dir);
        let credentials_path = cli
            .credentials
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| config_dir.join("credentials.json"));
        let tokens_path = cli
            .tokens
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| config_dir.join("tokens.json"));

        let api_base = url::Url::parse(&cli.api_base)
            .map_err(|e| anyhow::anyhow!("Invalid --api-base '{}': {}", cli.api_base, e))?;
        if !matches!(api_base.scheme(), "http" | "https") {
            anyhow::bail!("--api-base must be an http(s) URL, got '{}'", cli.api_base);
        }
        if cli.timeout_secs == 0 {
            anyhow::bail!("--timeout-secs must be greater than zero");
        }

        Ok(Self {
            db_path: config_dir.join("photosync.db"),
            config_dir,
            credentials_path,
            tokens_path,
            endpoints: Endpoints::for_base(&cli.api_base),
            http_timeout: Duration::from_secs(cli.timeout_secs),
            log_level: cli.log_level,
            no_progress_bar: cli.no_progress_bar,
        })
    }

    /// Pipeline settings for a `sync` invocation.
    pub fn upload_config(&self, args: &SyncArgs) -> anyhow::Result<UploadConfig> {
        let extensions = normalize_extensions(&args.extensions);
        if extensions.is_empty() {
            anyhow::bail!("At least one --extension is required");
        }
        Ok(UploadConfig {
            threads: usize::from(args.threads),
            dry_run: args.dry_run,
            extensions,
            no_progress_bar: self.no_progress_bar,
        })
    }
}

/// Lowercase, strip leading dots, drop empties and repeats.
fn normalize_extensions(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ext in raw {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["photosync"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn sync_args(cli: Cli) -> SyncArgs {
        match cli.command {
            Command::Sync(args) => args,
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn test_expand_tilde() {
        let p = expand_tilde("~/.photosync");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(p, home.join(".photosync"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("~user/x"), PathBuf::from("~user/x"));
    }

    #[test]
    fn test_paths_default_under_config_dir() {
        let cli = parse(&["--config-dir", "/etc/ps", "status"]);
        let cfg = Config::from_cli(&cli.global).unwrap();
        assert_eq!(cfg.credentials_path, PathBuf::from("/etc/ps/credentials.json"));
        assert_eq!(cfg.tokens_path, PathBuf::from("/etc/ps/tokens.json"));
        assert_eq!(cfg.db_path, PathBuf::from("/etc/ps/photosync.db"));
        assert_eq!(
            cfg.endpoints.media_items,
            "https://photoslibrary.googleapis.com/v1/mediaItems"
        );
    }

    #[test]
    fn test_explicit_credentials_and_tokens() {
        let cli = parse(&[
            "status",
            "--config-dir",
            "/etc/ps",
            "--credentials",
            "/secrets/client.json",
            "--tokens",
            "/var/lib/ps/t.json",
        ]);
        let cfg = Config::from_cli(&cli.global).unwrap();
        assert_eq!(cfg.credentials_path, PathBuf::from("/secrets/client.json"));
        assert_eq!(cfg.tokens_path, PathBuf::from("/var/lib/ps/t.json"));
        assert_eq!(cfg.db_path, PathBuf::from("/etc/ps/photosync.db"));
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let cli = parse(&["status", "--api-base", "not a url"]);
        assert!(Config::from_cli(&cli.global).is_err());
        let cli = parse(&["status", "--api-base", "ftp://example.com/v1"]);
        assert!(Config::from_cli(&cli.global).is_err());
    }

    #[test]
    fn test_custom_api_base() {
        let cli = parse(&["status", "--api-base", "http://127.0.0.1:9000/v1/"]);
        let cfg = Config::from_cli(&cli.global).unwrap();
        assert_eq!(cfg.endpoints.uploads, "http://127.0.0.1:9000/v1/uploads");
    }

    #[test]
    fn test_upload_config_passthrough() {
        let cli = parse(&["sync", "/p", "--threads", "3", "--dry-run", "--no-progress-bar"]);
        let cfg = Config::from_cli(&cli.global).unwrap();
        let upload = cfg.upload_config(&sync_args(cli)).unwrap();
        assert_eq!(upload.threads, 3);
        assert!(upload.dry_run);
        assert!(upload.no_progress_bar);
        assert_eq!(upload.extensions, vec!["jpg", "jpeg"]);
    }

    #[test]
    fn test_extensions_normalized() {
        assert_eq!(
            normalize_extensions(&[".JPG".into(), "jpg".into(), " Heic ".into(), "".into()]),
            vec!["jpg", "heic"]
        );
    }

    #[test]
    fn test_empty_extension_list_rejected() {
        let cli = parse(&["sync", "/p", "--extension", "."]);
        let cfg = Config::from_cli(&cli.global).unwrap();
        assert!(cfg.upload_config(&sync_args(cli)).is_err());
    }
}
