//! Application update check
//!
//! Looks up the latest release of the application's own repository and
//! caches the answer in `update_info.json`. Installing the new build is left
//! to whatever installed this one.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::extension::fetcher::RemoteFetcher;
use crate::extension::version;
use crate::paths::AppPaths;

/// Cached answers younger than this are reused
const RECHECK_HOURS: i64 = 4;

/// Contents of `update_info.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub latest_version: String,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppUpdateStatus {
    pub current_version: String,
    pub latest_version: String,
    pub update_available: bool,
    pub release_notes: Option<String>,
    pub last_checked: DateTime<Utc>,
    /// Answered from `update_info.json` without a request
    pub cached: bool,
}

impl AppUpdateStatus {
    fn from_info(current: &str, info: UpdateInfo, cached: bool) -> Self {
        Self {
            update_available: version::is_newer(&info.latest_version, current),
            current_version: current.to_string(),
            latest_version: info.latest_version,
            release_notes: info.release_notes,
            last_checked: info.last_checked,
            cached,
        }
    }
}

/// App Updater - release lookup for PlusNotes itself
pub struct AppUpdater {
    fetcher: RemoteFetcher,
    repository: String,
    info_file: PathBuf,
    current_version: String,
}

impl AppUpdater {
    pub fn new(paths: &AppPaths, config: &Config) -> Result<Self> {
        Ok(Self {
            fetcher: RemoteFetcher::new(&config.network)?,
            repository: config.updates.app_repository.clone(),
            info_file: paths.update_info_file(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Last saved answer; an unreadable file counts as missing
    pub fn cached(&self) -> Option<UpdateInfo> {
        if !self.info_file.is_file() {
            return None;
        }

        let parsed = fs::read_to_string(&self.info_file)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<UpdateInfo>(&content).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Ignoring {}: {}", self.info_file.display(), e);
                None
            }
        }
    }

    /// Status from the last check, without any request
    pub fn status(&self) -> Option<AppUpdateStatus> {
        self.cached()
            .map(|info| AppUpdateStatus::from_info(&self.current_version, info, true))
    }

    /// Compare the running version with the repository's latest release.
    ///
    /// An answer checked less than four hours before `now` is reused unless
    /// `force` is set. Failed lookups leave `update_info.json` untouched.
    pub async fn check(&self, force: bool, now: DateTime<Utc>) -> Result<AppUpdateStatus> {
        if !force {
            if let Some(info) = self.cached() {
                if now.signed_duration_since(info.last_checked) < Duration::hours(RECHECK_HOURS) {
                    debug!("Reusing update info from {}", info.last_checked);
                    return Ok(AppUpdateStatus::from_info(&self.current_version, info, true));
                }
            }
        }

        let repo = self.fetcher.parse_repository(&self.repository)?;
        let release = self.fetcher.fetch_latest_release(&repo).await?;
        let info = UpdateInfo {
            latest_version: version::strip_prefix(&release.version).to_string(),
            last_checked: now,
            release_notes: release.release_notes,
        };
        self.save(&info);

        let status = AppUpdateStatus::from_info(&self.current_version, info, false);
        if status.update_available {
            info!(
                "PlusNotes {} is available (running {})",
                status.latest_version, status.current_version
            );
        }
        Ok(status)
    }

    fn save(&self, info: &UpdateInfo) {
        let result = serde_json::to_string_pretty(info)
            .map_err(std::io::Error::other)
            .and_then(|content| {
                if let Some(dir) = self.info_file.parent() {
                    fs::create_dir_all(dir)?;
                }
                fs::write(&self.info_file, content)
            });
        if let Err(e) = result {
            warn!("Failed to save {}: {}", self.info_file.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_updater() -> (AppUpdater, AppPaths, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::with_root(temp_dir.path().to_path_buf());
        let updater = AppUpdater::new(&paths, &Config::default())
            .unwrap()
            .with_current_version("1.2.0");
        (updater, paths, temp_dir)
    }

    fn write_info(paths: &AppPaths, version: &str, last_checked: DateTime<Utc>) {
        let info = UpdateInfo {
            latest_version: version.to_string(),
            last_checked,
            release_notes: None,
        };
        fs::write(
            paths.update_info_file(),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_status_without_check() {
        let (updater, paths, _temp) = create_test_updater();
        assert!(updater.status().is_none());

        write_info(&paths, "1.10.0", Utc::now());
        let status = updater.status().unwrap();
        assert!(status.cached);
        assert!(status.update_available);
        assert_eq!(status.current_version, "1.2.0");

        write_info(&paths, "1.2.0", Utc::now());
        assert!(!updater.status().unwrap().update_available);
    }

    #[test]
    fn test_corrupt_info_is_ignored() {
        let (updater, paths, _temp) = create_test_updater();
        fs::write(paths.update_info_file(), "{ not json").unwrap();

        assert!(updater.cached().is_none());
        assert!(updater.status().is_none());
    }

    #[test]
    fn test_info_file_shape() {
        let info: UpdateInfo = serde_json::from_str(
            r#"{"latestVersion": "2.0.0", "lastChecked": "2025-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(info.latest_version, "2.0.0");
        assert!(info.release_notes.is_none());
    }

    #[tokio::test]
    async fn test_recent_answer_needs_no_request() {
        let (updater, paths, _temp) = create_test_updater();
        let now = Utc::now();
        write_info(&paths, "1.3.0", now - Duration::hours(1));

        // Served from update_info.json without a request
        let status = updater.check(false, now).await.unwrap();
        assert!(status.cached);
        assert_eq!(status.latest_version, "1.3.0");
        assert!(status.update_available);
    }
}
