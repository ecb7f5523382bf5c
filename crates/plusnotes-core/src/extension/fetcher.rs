//! Remote Fetcher
//!
//! HTTP side of repository installs and update checks. Repositories are
//! addressed GitHub-style: `https://<host>/<owner>/<repo>` with the metadata
//! API at `<api_base>/repos/<owner>/<repo>`.

use std::path::Path;
use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::config::NetworkConfig;
use crate::error::{PlusNotesError, Result};
use crate::extension::discovery::MANIFEST_FILE;
use crate::extension::types::ExtensionDescriptor;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RAW_CONTENT: &str = "application/vnd.github.raw";
const JSON_CONTENT: &str = "application/vnd.github+json";

/// A validated `owner/repo` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    url: Url,
    owner: String,
    name: String,
}

impl RepositoryRef {
    /// Normalized web URL (no trailing slash, `.git`, query or fragment)
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn archive_url(&self, branch: &str) -> String {
        format!("{}/archive/{}.zip", self.url(), branch)
    }
}

/// Version information published by a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRelease {
    pub version: String,
    pub release_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
}

/// Remote Fetcher - one HTTP client shared by all requests
pub struct RemoteFetcher {
    client: Client,
    config: NetworkConfig,
}

impl RemoteFetcher {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout()))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Validate a repository URL against the configured host
    pub fn parse_repository(&self, raw: &str) -> Result<RepositoryRef> {
        let invalid = |reason: &str| PlusNotesError::InvalidSource {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("only http and https URLs are supported"));
        }

        let host = url.host_str().unwrap_or_default();
        if !host.eq_ignore_ascii_case(&self.config.host) {
            return Err(invalid(&format!(
                "host must be {}, got '{}'",
                self.config.host, host
            )));
        }

        let segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let (owner, name) = match segments.as_slice() {
            [owner, name, ..] => (owner.clone(), name.trim_end_matches(".git").to_string()),
            _ => return Err(invalid("expected https://<host>/<owner>/<repo>")),
        };
        if name.is_empty() {
            return Err(invalid("repository name is empty"));
        }

        url.set_path(&format!("/{}/{}", owner, name));
        url.set_query(None);
        url.set_fragment(None);

        Ok(RepositoryRef { url, owner, name })
    }

    fn api_url(&self, repo: &RepositoryRef, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_base.trim_end_matches('/'),
            repo.owner,
            repo.name,
            suffix
        )
    }

    // ========== Install ==========

    /// Default branch from the metadata API, or the configured fallback
    pub async fn resolve_default_branch(&self, repo: &RepositoryRef) -> String {
        match self.query_default_branch(repo).await {
            Ok(Some(branch)) if !branch.is_empty() => branch,
            Ok(_) => {
                warn!(
                    "No default branch reported for {}, using '{}'",
                    repo.url(),
                    self.config.default_branch
                );
                self.config.default_branch.clone()
            }
            Err(e) => {
                warn!(
                    "Could not resolve default branch for {} ({}), using '{}'",
                    repo.url(),
                    e,
                    self.config.default_branch
                );
                self.config.default_branch.clone()
            }
        }
    }

    async fn query_default_branch(&self, repo: &RepositoryRef) -> Result<Option<String>> {
        let info: RepositoryInfo = self
            .client
            .get(self.api_url(repo, ""))
            .header(header::ACCEPT, JSON_CONTENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(info.default_branch)
    }

    /// Download the branch archive to `dest`
    pub async fn download_archive(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        dest: &Path,
    ) -> Result<()> {
        let url = repo.archive_url(branch);
        debug!("Downloading {}", url);

        let mut response = self.client.get(&url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    // ========== Update checks ==========

    /// Latest published version: the remote manifest first, then the
    /// latest tagged release
    pub async fn fetch_remote_version(&self, repo: &RepositoryRef) -> Result<RemoteRelease> {
        match self.fetch_manifest_version(repo).await {
            Ok(Some(version)) => {
                return Ok(RemoteRelease {
                    version,
                    release_notes: None,
                })
            }
            Ok(None) => debug!("Remote manifest of {} declares no version", repo.url()),
            Err(e) => debug!("Remote manifest of {} unavailable: {}", repo.url(), e),
        }

        self.fetch_latest_release(repo).await
    }

    async fn fetch_manifest_version(&self, repo: &RepositoryRef) -> Result<Option<String>> {
        let url = self.api_url(repo, &format!("/contents/{}", MANIFEST_FILE));
        let body = self
            .client
            .get(&url)
            .header(header::ACCEPT, RAW_CONTENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let manifest: ExtensionDescriptor =
            serde_json::from_str(&body).map_err(|e| PlusNotesError::Json {
                path: url.into(),
                message: e.to_string(),
            })?;
        Ok(manifest.version.filter(|v| !v.trim().is_empty()))
    }

    /// Latest tagged release of a repository, `v` prefix kept
    pub async fn fetch_latest_release(&self, repo: &RepositoryRef) -> Result<RemoteRelease> {
        let response = self
            .client
            .get(self.api_url(repo, "/releases/latest"))
            .header(header::ACCEPT, JSON_CONTENT)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PlusNotesError::NoRelease {
                url: repo.url().to_string(),
            });
        }

        let release: LatestRelease = response.error_for_status()?.json().await?;
        Ok(RemoteRelease {
            version: release.tag_name,
            release_notes: release.body.filter(|b| !b.trim().is_empty()),
        })
    }
}
