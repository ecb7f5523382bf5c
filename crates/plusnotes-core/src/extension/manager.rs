//! Extension Manager
//!
//! Facade owning the registry and every component that feeds it. One
//! manager per application; all operations take `&mut self` and run as a
//! sequential async pipeline.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::builtin;
use crate::config::Config;
use crate::error::{PlusNotesError, Result};
use crate::extension::discovery::{Discovery, SkippedArtifact, MANIFEST_FILE};
use crate::extension::fetcher::RemoteFetcher;
use crate::extension::installer::PackageInstaller;
use crate::extension::lifecycle;
use crate::extension::registry::ExtensionRegistry;
use crate::extension::types::{
    BatchOutcome, DynExtension, Extension, ExtensionDescriptor, UpdateCheck,
};
use crate::extension::update;
use crate::paths::AppPaths;

/// What happened during [`ExtensionManager::initialize`]
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Artifacts discovery could not load or register
    pub skipped: Vec<SkippedArtifact>,
    /// One outcome per id in the persisted enabled-set
    pub initialized: Vec<BatchOutcome>,
}

impl StartupReport {
    pub fn failures(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.initialized.iter().filter(|o| !o.is_ok())
    }
}

/// Extension Manager - registry, discovery, lifecycle, install and updates
pub struct ExtensionManager {
    paths: AppPaths,
    registry: ExtensionRegistry,
    discovery: Discovery,
    installer: PackageInstaller,
    fetcher: RemoteFetcher,
    check_interval: chrono::Duration,
}

impl ExtensionManager {
    /// Create the data layout if needed and register the built-ins.
    ///
    /// Nothing is discovered or initialized until [`initialize`](Self::initialize).
    pub fn new(paths: AppPaths, config: &Config) -> Result<Self> {
        paths.ensure()?;

        let mut registry = ExtensionRegistry::new(paths.enabled_file());
        for instance in builtin::all(&paths) {
            let descriptor = ExtensionDescriptor::built_in(instance.metadata());
            registry.register(descriptor, Some(instance))?;
        }

        Ok(Self {
            installer: PackageInstaller::new(paths.downloaded_dir()),
            fetcher: RemoteFetcher::new(&config.network)?,
            check_interval: config.updates.check_interval(),
            discovery: Discovery::default(),
            registry,
            paths,
        })
    }

    /// Replace the loaders used for discovery and installs
    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    // ========== Queries ==========

    pub fn list_available(&self) -> Vec<&ExtensionDescriptor> {
        self.registry.list_available()
    }

    pub fn list_enabled(&self) -> Vec<&ExtensionDescriptor> {
        self.registry.list_enabled()
    }

    pub fn get(&self, id: &str) -> Option<&ExtensionDescriptor> {
        self.registry.get(id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.registry.is_enabled(id)
    }

    // ========== Startup / Shutdown ==========

    /// Discover extensions, restore the enabled-set and initialize it
    pub async fn initialize(&mut self) -> StartupReport {
        let skipped = self.refresh().await;
        self.registry.load_enabled();
        let initialized = lifecycle::initialize_enabled(&mut self.registry).await;

        info!(
            "Extensions ready: {} available, {} enabled",
            self.registry.len(),
            self.registry.enabled_ids().len()
        );
        StartupReport {
            skipped,
            initialized,
        }
    }

    /// Shut down every initialized extension; the enabled-set is kept
    pub async fn shutdown(&mut self) {
        lifecycle::shutdown_all(&mut self.registry).await;
    }

    /// Folders scanned by discovery: the extensions root, then each install
    fn scan_folders(&self) -> Vec<PathBuf> {
        let mut folders = vec![self.paths.extensions_dir()];

        if let Ok(entries) = fs::read_dir(self.paths.downloaded_dir()) {
            let mut installs: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            installs.sort();
            folders.extend(installs);
        }

        folders
    }

    /// Re-run discovery and reconcile the registry with what is on disk.
    ///
    /// Entries still present from the same source keep their live state;
    /// vanished ones are shut down and dropped. Running it twice changes
    /// nothing.
    pub async fn refresh(&mut self) -> Vec<SkippedArtifact> {
        let mut found = Vec::new();
        let mut skipped = Vec::new();
        for folder in self.scan_folders() {
            let report = self.discovery.discover(&folder);
            found.extend(report.found);
            skipped.extend(report.skipped);
        }

        let present: HashSet<(String, String)> = found
            .iter()
            .map(|f| (f.descriptor.id.clone(), f.descriptor.source_location.clone()))
            .collect();
        let is_present =
            |d: &ExtensionDescriptor| present.contains(&(d.id.clone(), d.source_location.clone()));

        let vanished: Vec<String> = self
            .registry
            .entries()
            .filter(|e| !e.descriptor.is_built_in && !is_present(&e.descriptor))
            .map(|e| e.descriptor.id.clone())
            .collect();
        for id in &vanished {
            if let Some(entry) = self.registry.entry_mut(id) {
                lifecycle::shutdown_entry(entry).await;
            }
        }
        for removed in self.registry.retain_discovered(is_present) {
            debug!("Extension {} is gone", removed.descriptor.id);
        }

        for item in found {
            let live = self
                .registry
                .get(&item.descriptor.id)
                .map(|d| d.is_initialized && d.source_location == item.descriptor.source_location)
                .unwrap_or(false);
            if live {
                continue;
            }

            let path = PathBuf::from(&item.descriptor.source_location);
            if let Err(e) = self.registry.register(item.descriptor, item.instance) {
                warn!("Not registering {}: {}", path.display(), e);
                skipped.push(SkippedArtifact { path, error: e });
            }
        }

        skipped
    }

    // ========== Lifecycle ==========

    pub async fn enable(&mut self, id: &str) -> Result<()> {
        lifecycle::enable(&mut self.registry, id).await
    }

    pub async fn disable(&mut self, id: &str) -> Result<()> {
        lifecycle::disable(&mut self.registry, id).await
    }

    pub async fn enable_many(&mut self, ids: &[String]) -> Vec<BatchOutcome> {
        lifecycle::enable_many(&mut self.registry, ids).await
    }

    pub async fn disable_many(&mut self, ids: &[String]) -> Vec<BatchOutcome> {
        lifecycle::disable_many(&mut self.registry, ids).await
    }

    // ========== Install / Uninstall ==========

    /// Install a local `.zip` package or native library
    pub async fn install_file(&mut self, path: &Path) -> Result<ExtensionDescriptor> {
        let installed = self.installer.install_file(path, &self.discovery).await?;
        self.register_installed(installed).await
    }

    /// Download a repository's default-branch archive and install it.
    ///
    /// Any failure leaves the registry untouched.
    pub async fn fetch_from_repository(&mut self, url: &str) -> Result<ExtensionDescriptor> {
        self.fetch_and_install(url, None).await
    }

    /// `known_id` names the installed copy a package without an id replaces.
    /// Without one, an extension already tracking the repository is used.
    async fn fetch_and_install(
        &mut self,
        url: &str,
        known_id: Option<&str>,
    ) -> Result<ExtensionDescriptor> {
        let repo = self.fetcher.parse_repository(url)?;
        let known_id = known_id
            .map(str::to_string)
            .or_else(|| self.tracking_id(repo.url()));
        let branch = self.fetcher.resolve_default_branch(&repo).await;

        let download_dir = tempfile::Builder::new()
            .prefix("plusnotes-download-")
            .tempdir()?;
        let archive = download_dir.path().join("package.zip");
        self.fetcher
            .download_archive(&repo, &branch, &archive)
            .await?;

        let installed = self
            .installer
            .install_archive(
                &archive,
                &self.discovery,
                Some(repo.url()),
                known_id.as_deref(),
            )
            .await?;
        drop(download_dir);

        self.register_installed(installed).await
    }

    fn tracking_id(&self, repository_url: &str) -> Option<String> {
        self.registry
            .list_available()
            .into_iter()
            .find(|d| !d.is_built_in && d.repository_url.as_deref() == Some(repository_url))
            .map(|d| d.id.clone())
    }

    /// Register a freshly installed package, replacing any previous version.
    ///
    /// An enabled previous version is disabled first and the new one is
    /// enabled in its place.
    async fn register_installed(
        &mut self,
        installed: ExtensionDescriptor,
    ) -> Result<ExtensionDescriptor> {
        let id = installed.id.clone();
        let mut was_enabled = false;

        if let Some(existing) = self.registry.get(&id).cloned() {
            if existing.is_built_in {
                if let Some(dir) = installed.install_path.as_deref() {
                    if let Err(e) = self.installer.remove_install(dir) {
                        warn!("Failed to clean up {}: {}", dir.display(), e);
                    }
                }
                return Err(PlusNotesError::DuplicateId {
                    id,
                    existing: existing.source_location,
                });
            }

            was_enabled = self.registry.is_enabled(&id);
            if was_enabled {
                lifecycle::disable(&mut self.registry, &id).await?;
            } else if let Some(entry) = self.registry.entry_mut(&id) {
                lifecycle::shutdown_entry(entry).await;
            }
            self.registry.remove(&id)?;

            if existing.install_path != installed.install_path {
                debug!("Removing superseded {} at {}", id, existing.source_location);
                if let Err(e) = self.delete_files(&existing) {
                    warn!("Failed to remove superseded {}: {}", id, e);
                }
            }
        }

        let (descriptor, instance) = self.load_installed(&installed);
        self.registry.register(descriptor, instance)?;

        if was_enabled {
            if let Err(e) = lifecycle::enable(&mut self.registry, &id).await {
                warn!("{} was enabled before the update but failed to start: {}", id, e);
            }
        }

        self.registry
            .get(&id)
            .cloned()
            .ok_or(PlusNotesError::ExtensionNotFound { id })
    }

    /// Discover the install directory to get a live instance
    fn load_installed(
        &self,
        installed: &ExtensionDescriptor,
    ) -> (ExtensionDescriptor, Option<DynExtension>) {
        let Some(dir) = installed.install_path.as_deref() else {
            return (installed.clone(), None);
        };

        let report = self.discovery.discover(dir);
        for skipped in &report.skipped {
            warn!("{}: {}", skipped.path.display(), skipped.error);
        }

        match report
            .found
            .into_iter()
            .find(|f| f.descriptor.id == installed.id)
        {
            Some(found) => {
                let mut descriptor = found.descriptor;
                descriptor.repository_url = installed.repository_url.clone();
                descriptor.last_updated = installed.last_updated;
                descriptor.package_sha256 = installed.package_sha256.clone();
                (descriptor, found.instance)
            }
            None => (installed.clone(), None),
        }
    }

    /// Remove an installed extension and its files.
    ///
    /// An enabled extension is disabled (and shut down) first.
    pub async fn uninstall(&mut self, id: &str) -> Result<()> {
        let descriptor = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| PlusNotesError::ExtensionNotFound { id: id.to_string() })?;
        if descriptor.is_built_in {
            return Err(PlusNotesError::BuiltInExtension { id: id.to_string() });
        }

        if self.registry.is_enabled(id) {
            lifecycle::disable(&mut self.registry, id).await?;
        } else if let Some(entry) = self.registry.entry_mut(id) {
            lifecycle::shutdown_entry(entry).await;
        }

        // Dropping the instance unloads native code before its files go
        self.registry.remove(id)?;
        self.delete_files(&descriptor)?;

        info!("Uninstalled extension {}", id);
        Ok(())
    }

    fn delete_files(&self, descriptor: &ExtensionDescriptor) -> Result<()> {
        if let Some(dir) = descriptor.install_path.as_deref() {
            if self.installer.owns(dir) {
                return self.installer.remove_install(dir);
            }
        }

        let artifact = Path::new(&descriptor.source_location);
        let is_manifest = artifact.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE);
        if artifact.is_file() && !is_manifest && artifact.starts_with(self.paths.extensions_dir()) {
            fs::remove_file(artifact)?;
        }
        Ok(())
    }

    // ========== Updates ==========

    /// Check one extension for a newer remote version
    pub async fn check_update(&self, id: &str) -> Result<UpdateCheck> {
        let descriptor = self
            .registry
            .get(id)
            .ok_or_else(|| PlusNotesError::ExtensionNotFound { id: id.to_string() })?;
        Ok(update::check_update(&self.fetcher, descriptor, self.check_interval, Utc::now()).await)
    }

    /// Check every extension that tracks a repository.
    ///
    /// One failing check never stops the others.
    pub async fn check_updates(&self) -> Vec<UpdateCheck> {
        let now = Utc::now();
        let mut checks = Vec::new();
        for descriptor in self.registry.list_available() {
            if descriptor.is_built_in || descriptor.repository_url.is_none() {
                continue;
            }
            checks.push(update::check_update(&self.fetcher, descriptor, self.check_interval, now).await);
        }
        checks
    }

    /// Check for updates and re-fetch every extension that has one
    pub async fn apply_updates(&mut self) -> Vec<UpdateCheck> {
        let mut checks = self.check_updates().await;

        for check in checks.iter_mut().filter(|c| c.update_available) {
            let Some(url) = self
                .registry
                .get(&check.extension_id)
                .and_then(|d| d.repository_url.clone())
            else {
                continue;
            };

            match self
                .fetch_and_install(&url, Some(check.extension_id.as_str()))
                .await
            {
                Ok(_) => check.updated = true,
                Err(e) => {
                    warn!("Updating {} failed: {}", check.extension_id, e);
                    check.error = Some(e.to_string());
                }
            }
        }

        checks
    }
}
