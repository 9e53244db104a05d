//! # Model Asset Registry
//!
//! Resolves the weights file for each [`ModelKind`], downloading it from the
//! HuggingFace Hub the first time it is needed.
//!
//! ## Resolution Order:
//! 1. `models.assets_dir/<file>` on local disk
//! 2. `models.hub_repo` via `hf-hub` (cached on disk by hf-hub itself)
//!
//! ## Concurrency:
//! Each kind is guarded by its own `tokio::sync::OnceCell`. Sessions that ask for
//! the same model at the same moment wait on one download instead of starting
//! their own. A failed resolution leaves the cell empty, so a later session retries.
//!
//! ## State Transitions:
//! Available → Downloading → Ready, or Error on failure (Error → Downloading on retry)

use anyhow::{anyhow, Result};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

use crate::config::ModelsConfig;
use crate::vision::ModelKind;

/// Where a session gets its model file from.
pub trait ModelResolver: Send + Sync {
    /// Path to the asset for `kind`, or `None` when it cannot be obtained.
    fn ensure_model(&self, kind: ModelKind) -> BoxFuture<'_, Option<PathBuf>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssetStatus {
    /// Known but not resolved yet
    Available,
    Downloading,
    Ready { path: PathBuf },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetEntry {
    pub model: ModelKind,
    pub file: String,
    pub status: AssetStatus,
}

pub struct AssetRegistry {
    settings: ModelsConfig,
    cells: HashMap<ModelKind, OnceCell<PathBuf>>,
    statuses: RwLock<HashMap<ModelKind, AssetStatus>>,
}

impl AssetRegistry {
    pub fn new(settings: ModelsConfig) -> Self {
        let cells = ModelKind::ALL.iter().map(|k| (*k, OnceCell::new())).collect();
        let statuses = ModelKind::ALL.iter().map(|k| (*k, AssetStatus::Available)).collect();

        Self {
            settings,
            cells,
            statuses: RwLock::new(statuses),
        }
    }

    pub async fn list(&self) -> Vec<AssetEntry> {
        let statuses = self.statuses.read().await;
        ModelKind::ALL
            .iter()
            .map(|kind| AssetEntry {
                model: *kind,
                file: self.settings.file_for(*kind).to_string(),
                status: statuses.get(kind).cloned().unwrap_or(AssetStatus::Available),
            })
            .collect()
    }

    /// Resolve `kind`, downloading at most once across concurrent callers.
    pub async fn resolve(&self, kind: ModelKind) -> Result<PathBuf> {
        let cell = self
            .cells
            .get(&kind)
            .ok_or_else(|| anyhow!("No asset slot for {}", kind))?;

        let result = cell.get_or_try_init(|| self.fetch(kind)).await.cloned();

        if let Err(e) = &result {
            warn!("Model asset {} unavailable: {}", kind, e);
            self.set_status(kind, AssetStatus::Error { message: e.to_string() }).await;
        }
        result
    }

    async fn fetch(&self, kind: ModelKind) -> Result<PathBuf> {
        let file = self.settings.file_for(kind);
        let local = PathBuf::from(&self.settings.assets_dir).join(file);

        if local.is_file() {
            info!("Using local model asset {:?}", local);
            self.set_status(kind, AssetStatus::Ready { path: local.clone() }).await;
            return Ok(local);
        }

        if self.settings.hub_repo.trim().is_empty() {
            return Err(anyhow!(
                "{} not found in {} and no hub repository configured",
                file,
                self.settings.assets_dir
            ));
        }

        self.set_status(kind, AssetStatus::Downloading).await;
        info!("Downloading {} from {}", file, self.settings.hub_repo);

        let path = download(&self.settings.hub_repo, file).await?;
        info!("Model asset {} ready at {:?}", kind, path);
        self.set_status(kind, AssetStatus::Ready { path: path.clone() }).await;
        Ok(path)
    }

    async fn set_status(&self, kind: ModelKind, status: AssetStatus) {
        self.statuses.write().await.insert(kind, status);
    }
}

impl ModelResolver for AssetRegistry {
    fn ensure_model(&self, kind: ModelKind) -> BoxFuture<'_, Option<PathBuf>> {
        Box::pin(async move { self.resolve(kind).await.ok() })
    }
}

async fn download(repo: &str, file: &str) -> Result<PathBuf> {
    use hf_hub::api::tokio::ApiBuilder;

    let mut builder = ApiBuilder::new().with_progress(false);
    if let Ok(token) = std::env::var("HF_TOKEN") {
        builder = builder.with_token(Some(token));
    }
    if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
        builder = builder.with_cache_dir(cache_dir.into());
    }

    let api = builder
        .build()
        .map_err(|e| anyhow!("Failed to create HuggingFace client: {}", e))?;

    api.model(repo.to_string())
        .get(file)
        .await
        .map_err(|e| anyhow!("Failed to download {} from {}: {}", file, repo, e))
}
