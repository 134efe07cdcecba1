use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::consent::ConsentFlow;
use super::credentials::ClientConfig;
use super::error::AuthError;

/// Access/refresh token pair, persisted as `{"token": ..., "refresh_token": ...}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "token")]
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// The access token in effect at a point in time, tagged with the
/// generation it belongs to. A refresh bumps the generation, which lets a
/// caller holding a stale snapshot notice that someone else already refreshed.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub access_token: String,
    pub generation: u64,
}

struct TokenState {
    pair: TokenPair,
    generation: u64,
}

/// Sole owner of the current token pair and of its on-disk copy.
///
/// Writes go through a sibling temp file that is fsynced and renamed over
/// the target, so the file always holds either the old or the new pair.
pub struct TokenStore {
    path: PathBuf,
    state: RwLock<Option<TokenState>>,
    /// Exclusive advisory lock held for the lifetime of the store; released
    /// when the file is dropped.
    #[allow(dead_code)]
    lock_file: std::fs::File,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Open the store backed by `path`, taking the per-directory instance lock.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create token directory: {}", parent.display())
            })?;
        }

        let lock_path = lock_path_for(&path);
        let lock_file = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::create(&lock_path).with_context(|| {
                format!("Failed to create lock file: {}", lock_path.display())
            })?;
            file.try_lock_exclusive().map_err(|_| {
                anyhow::anyhow!(
                    "Another photosync instance is using these tokens (lock: {})",
                    lock_path.display()
                )
            })?;
            Ok::<std::fs::File, anyhow::Error>(file)
        })
        .await??;

        Ok(Self {
            path,
            state: RwLock::new(None),
            lock_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted pair and make it current.
    ///
    /// A missing, unreadable or corrupt file yields `None`; the caller is
    /// expected to fall back to the consent flow.
    pub async fn load(&self) -> Option<TokenPair> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Token file {} does not exist", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Could not read token file {}: {}", self.path.display(), e);
                return None;
            }
        };
        let pair: TokenPair = match serde_json::from_str(&contents) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Token file {} is corrupt: {}", self.path.display(), e);
                return None;
            }
        };

        let mut state = self.state.write().await;
        let generation = state.as_ref().map_or(0, |s| s.generation + 1);
        *state = Some(TokenState {
            pair: pair.clone(),
            generation,
        });
        tracing::debug!("Loaded tokens from {}", self.path.display());
        Some(pair)
    }

    /// Atomically persist `pair` and make it current.
    pub async fn save(&self, pair: &TokenPair) -> Result<(), AuthError> {
        let mut state = self.state.write().await;

        let staged = self.stage(pair).await?;
        if let Err(e) = staged.commit().await {
            let _ = fs::remove_file(temp_path_for(&self.path)).await;
            return Err(e.into());
        }

        let generation = state.as_ref().map_or(0, |s| s.generation + 1);
        *state = Some(TokenState {
            pair: pair.clone(),
            generation,
        });
        tracing::debug!("Saved tokens to {}", self.path.display());
        Ok(())
    }

    /// Run the interactive consent flow and persist its result.
    pub async fn acquire_initial(
        &self,
        client_config: &ClientConfig,
        consent: &dyn ConsentFlow,
    ) -> Result<TokenPair, AuthError> {
        tracing::info!("Tokens not found, launching the OAuth consent flow");
        let pair = consent.obtain_initial_tokens(client_config).await?;
        self.save(&pair).await?;
        Ok(pair)
    }

    /// Load the persisted pair, or acquire one interactively if there is none.
    pub async fn load_or_acquire(
        &self,
        client_config: &ClientConfig,
        consent: &dyn ConsentFlow,
    ) -> Result<TokenPair, AuthError> {
        match self.load().await {
            Some(pair) => Ok(pair),
            None => self.acquire_initial(client_config, consent).await,
        }
    }

    /// Current access token and its generation.
    pub async fn snapshot(&self) -> Result<TokenSnapshot, AuthError> {
        let state = self.state.read().await;
        state
            .as_ref()
            .map(|s| TokenSnapshot {
                access_token: s.pair.access_token.clone(),
                generation: s.generation,
            })
            .ok_or(AuthError::MissingTokens)
    }

    /// Full current pair, needed by the refresher.
    pub async fn current_pair(&self) -> Result<TokenPair, AuthError> {
        let state = self.state.read().await;
        state
            .as_ref()
            .map(|s| s.pair.clone())
            .ok_or(AuthError::MissingTokens)
    }

    /// First half of an atomic save: the new content is written and synced
    /// to the temp file, but the target is untouched until `commit`.
    async fn stage(&self, pair: &TokenPair) -> Result<StagedTokens, AuthError> {
        let temp = temp_path_for(&self.path);
        let json = serde_json::to_vec_pretty(pair)?;

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            // Token files grant account access; keep them owner-only.
            options.mode(0o600);
        }
        let mut file = options.open(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        Ok(StagedTokens {
            temp,
            target: self.path.clone(),
        })
    }
}

/// A fully written temp file waiting to replace the token file.
struct StagedTokens {
    temp: PathBuf,
    target: PathBuf,
}

impl StagedTokens {
    async fn commit(self) -> std::io::Result<()> {
        fs::rename(&self.temp, &self.target).await
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "tokens.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "tokens.json".into());
    name.push(".lock");
    path.with_file_name(name)
}
