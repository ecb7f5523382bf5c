//! Cloud sync
//!
//! Keeps per-service settings in `sync_config.json`. Transfers are not
//! implemented yet: a sync waits for the configured delay and reports a
//! fixed file count.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PlusNotesError, Result};
use crate::extension::{Extension, ExtensionMetadata};

pub const SYNC_ID: &str = "sync";

pub const AVAILABLE_SERVICES: [&str; 3] = ["GoogleDrive", "OneDrive", "Dropbox"];

const SIMULATED_DELAY: Duration = Duration::from_secs(2);
const SIMULATED_FILE_COUNT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval_minutes: u32,
    pub last_sync: Option<DateTime<Utc>>,
    pub enabled_services: Vec<String>,
    pub service_configs: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: false,
            sync_interval_minutes: 30,
            last_sync: None,
            enabled_services: Vec::new(),
            service_configs: BTreeMap::new(),
        }
    }
}

impl SyncConfig {
    fn is_configured(&self, service: &str) -> bool {
        self.enabled_services.iter().any(|s| s == service)
            && self.service_configs.contains_key(service)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    pub synced_files: u32,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            synced_files: 0,
            last_sync: None,
        }
    }
}

/// Clears the in-progress flag however the sync ends
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sync Extension - one sync at a time, per configured service
pub struct SyncExtension {
    config_file: PathBuf,
    config: Mutex<SyncConfig>,
    in_progress: AtomicBool,
    delay: Duration,
}

impl SyncExtension {
    pub fn new(config_file: PathBuf) -> Self {
        Self {
            config_file,
            config: Mutex::new(SyncConfig::default()),
            in_progress: AtomicBool::new(false),
            delay: SIMULATED_DELAY,
        }
    }

    /// Override the simulated transfer time
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn available_services(&self) -> &'static [&'static str] {
        &AVAILABLE_SERVICES
    }

    pub async fn config(&self) -> SyncConfig {
        self.config.lock().await.clone()
    }

    /// Load settings; a missing or corrupt file means defaults
    pub async fn load_config(&self) {
        let loaded = if self.config_file.exists() {
            match read_config(&self.config_file) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring sync settings: {}", e);
                    SyncConfig::default()
                }
            }
        } else {
            SyncConfig::default()
        };
        *self.config.lock().await = loaded;
    }

    pub async fn save_config(&self) -> Result<()> {
        let config = self.config.lock().await.clone();
        write_config(&self.config_file, &config)
    }

    /// Enable a service with its settings
    pub async fn configure_service(
        &self,
        service: &str,
        settings: BTreeMap<String, String>,
    ) -> Result<()> {
        {
            let mut config = self.config.lock().await;
            config.service_configs.insert(service.to_string(), settings);
            if !config.enabled_services.iter().any(|s| s == service) {
                config.enabled_services.push(service.to_string());
            }
        }
        self.save_config().await
    }

    pub async fn disable_service(&self, service: &str) -> Result<()> {
        self.config
            .lock()
            .await
            .enabled_services
            .retain(|s| s != service);
        self.save_config().await
    }

    pub async fn set_auto_sync(&self, enabled: bool, interval_minutes: u32) -> Result<()> {
        {
            let mut config = self.config.lock().await;
            config.auto_sync = enabled;
            config.sync_interval_minutes = interval_minutes;
        }
        self.save_config().await
    }

    /// Sync with one service.
    ///
    /// Refuses to start while another sync is running or when the service
    /// has not been configured.
    pub async fn sync_with_service(&self, service: &str) -> SyncResult {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return SyncResult::failed("a sync is already in progress");
        }
        let _guard = InProgress(&self.in_progress);

        if !self.config.lock().await.is_configured(service) {
            return SyncResult::failed(format!("service {} is not configured", service));
        }

        debug!("Syncing with {}", service);
        tokio::time::sleep(self.delay).await;

        let now = Utc::now();
        self.config.lock().await.last_sync = Some(now);
        if let Err(e) = self.save_config().await {
            warn!("Failed to save sync settings: {}", e);
        }

        info!("Synced with {}", service);
        SyncResult {
            success: true,
            message: format!("synced with {}", service),
            synced_files: SIMULATED_FILE_COUNT,
            last_sync: Some(now),
        }
    }
}

fn read_config(path: &Path) -> Result<SyncConfig> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| PlusNotesError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write_config(path: &Path, config: &SyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config).map_err(|e| PlusNotesError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, content)?;
    Ok(())
}

#[async_trait]
impl Extension for SyncExtension {
    fn metadata(&self) -> ExtensionMetadata {
        ExtensionMetadata::new(SYNC_ID, "Cloud Sync")
            .with_description("Sync notes with Google Drive, OneDrive or Dropbox")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_author("PlusNotes")
    }

    async fn initialize(&mut self) -> anyhow::Result<()> {
        self.load_config().await;
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.save_config().await?;
        Ok(())
    }
}
