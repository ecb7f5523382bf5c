//! Update checks for installed extensions

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::extension::fetcher::RemoteFetcher;
use crate::extension::types::{ExtensionDescriptor, UpdateCheck};
use crate::extension::version;

/// Whether enough time has passed since the last update to check again
pub fn is_due(descriptor: &ExtensionDescriptor, interval: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(descriptor.last_updated) >= interval
}

/// Compare one descriptor against its repository.
///
/// Never fails: problems are reported through `UpdateCheck::error`.
pub async fn check_update(
    fetcher: &RemoteFetcher,
    descriptor: &ExtensionDescriptor,
    interval: Duration,
    now: DateTime<Utc>,
) -> UpdateCheck {
    let mut check = UpdateCheck::new(descriptor);

    let Some(url) = descriptor.repository_url.as_deref() else {
        check.error = Some("extension has no repository URL".to_string());
        return check;
    };

    if !is_due(descriptor, interval, now) {
        debug!(
            "Skipping update check for {}: updated {}",
            descriptor.id, descriptor.last_updated
        );
        check.skipped = true;
        return check;
    }

    let release = match fetcher.parse_repository(url) {
        Ok(repo) => fetcher.fetch_remote_version(&repo).await,
        Err(e) => Err(e),
    };

    match release {
        Ok(release) => {
            check.remote_version = version::strip_prefix(&release.version).to_string();
            check.release_notes = release.release_notes;
            check.update_available =
                version::is_newer(&check.remote_version, &check.current_version);
            if check.update_available {
                info!(
                    "Update available for {}: {} -> {}",
                    descriptor.id, check.current_version, check.remote_version
                );
            }
        }
        Err(e) => {
            debug!("Update check for {} failed: {}", descriptor.id, e);
            check.error = Some(e.to_string());
        }
    }

    check
}
