//! Package Installer
//!
//! Unpacks archives and single artifacts into `Downloaded/<id>/` and writes
//! the package manifest there. Registration is left to the manager.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{PlusNotesError, Result};
use crate::extension::discovery::{read_manifest, Discovery, MANIFEST_FILE};
use crate::extension::types::{ExtensionDescriptor, ExtensionMetadata};

/// Where the package's identity came from
enum PackageSource {
    Manifest(PathBuf),
    Artifact(PathBuf),
}

impl PackageSource {
    fn path(&self) -> &Path {
        match self {
            Self::Manifest(p) | Self::Artifact(p) => p,
        }
    }
}

pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = fs::read(path)?;
    Ok(compute_hash(&content))
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Package Installer - owns `Extensions/Downloaded`
pub struct PackageInstaller {
    downloaded_dir: PathBuf,
}

impl PackageInstaller {
    pub fn new(downloaded_dir: PathBuf) -> Self {
        Self { downloaded_dir }
    }

    pub fn downloaded_dir(&self) -> &Path {
        &self.downloaded_dir
    }

    /// Install directory for an extension id
    pub fn install_dir(&self, id: &str) -> PathBuf {
        self.downloaded_dir.join(id)
    }

    /// True for directories this installer created (never the root itself)
    pub fn owns(&self, path: &Path) -> bool {
        path != self.downloaded_dir && path.starts_with(&self.downloaded_dir)
    }

    // ========== Install ==========

    /// Install a local package: a `.zip` archive or a single loadable artifact
    pub async fn install_file(
        &self,
        path: &Path,
        discovery: &Discovery,
    ) -> Result<ExtensionDescriptor> {
        if !path.is_file() {
            return Err(PlusNotesError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("package not found: {}", path.display()),
            )));
        }

        if is_zip(path) {
            return self.install_archive(path, discovery, None, None).await;
        }

        if discovery.accepts(path) {
            return self.install_artifact(path, discovery);
        }

        Err(PlusNotesError::UnsupportedPackage {
            path: path.to_path_buf(),
        })
    }

    /// Unpack a zip archive and install the package inside it.
    ///
    /// The archive may nest the package at any depth (GitHub archives wrap
    /// everything in `<repo>-<branch>/`). `repository_url` is recorded in the
    /// manifest for update checks. `fallback_id` is used when the package
    /// declares no id of its own, so updates land on the installed copy.
    pub async fn install_archive(
        &self,
        archive: &Path,
        discovery: &Discovery,
        repository_url: Option<&str>,
        fallback_id: Option<&str>,
    ) -> Result<ExtensionDescriptor> {
        let digest = compute_file_hash(archive)?;

        let extract_dir = tempfile::Builder::new()
            .prefix("plusnotes-extract-")
            .tempdir()?;
        extract_archive(archive, extract_dir.path()).await?;

        let source = locate_package(extract_dir.path(), discovery).ok_or_else(|| {
            PlusNotesError::NoCapabilityFound {
                path: archive.to_path_buf(),
            }
        })?;
        debug!("Package entry point: {}", source.path().display());

        let mut descriptor = package_descriptor(&source, discovery, fallback_id)?;
        let target = self.prepare_target(&descriptor.id, source.path())?;

        let owning_dir = source.path().parent().unwrap_or(extract_dir.path());
        copy_dir_recursive(owning_dir, &target)?;

        descriptor.source_location = match &source {
            PackageSource::Manifest(_) => target.join(MANIFEST_FILE),
            PackageSource::Artifact(p) => target.join(p.file_name().unwrap_or_default()),
        }
        .display()
        .to_string();
        if let Some(url) = repository_url {
            descriptor.repository_url = Some(url.to_string());
        }
        descriptor.package_sha256 = Some(digest);
        self.finish(&mut descriptor, target);

        info!(
            "Installed {} {} from {}",
            descriptor.id,
            descriptor.version_or_default(),
            archive.display()
        );
        Ok(descriptor)
    }

    fn install_artifact(&self, path: &Path, discovery: &Discovery) -> Result<ExtensionDescriptor> {
        let source = PackageSource::Artifact(path.to_path_buf());
        let mut descriptor = package_descriptor(&source, discovery, None)?;
        let target = self.prepare_target(&descriptor.id, path)?;

        let file_name = path.file_name().unwrap_or_default();
        fs::create_dir_all(&target)?;
        fs::copy(path, target.join(file_name))?;

        descriptor.source_location = target.join(file_name).display().to_string();
        descriptor.package_sha256 = Some(compute_file_hash(path)?);
        self.finish(&mut descriptor, target);

        info!("Installed {} from {}", descriptor.id, path.display());
        Ok(descriptor)
    }

    /// Validate the id as a directory name and clear any previous install
    fn prepare_target(&self, id: &str, origin: &Path) -> Result<PathBuf> {
        let usable = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\', ':']);
        if !usable {
            return Err(PlusNotesError::LoadFailed {
                path: origin.to_path_buf(),
                message: format!("extension id '{}' cannot be used as a directory name", id),
            });
        }

        let target = self.install_dir(id);
        if target.exists() {
            debug!("Replacing previous install at {}", target.display());
            fs::remove_dir_all(&target)?;
        }
        Ok(target)
    }

    fn finish(&self, descriptor: &mut ExtensionDescriptor, target: PathBuf) {
        descriptor.install_path = Some(target);
        descriptor.is_built_in = false;
        descriptor.is_initialized = false;
        descriptor.last_updated = Utc::now();
        self.write_manifest(descriptor);
    }

    /// Write `extension.json` into the install dir.
    ///
    /// Failures are logged only: the files are in place and the package
    /// still works, it just loses its update tracking.
    fn write_manifest(&self, descriptor: &ExtensionDescriptor) {
        let Some(dir) = descriptor.install_path.as_ref() else {
            return;
        };
        let path = dir.join(MANIFEST_FILE);

        let result = serde_json::to_string_pretty(descriptor)
            .map_err(std::io::Error::other)
            .and_then(|content| fs::write(&path, content));
        if let Err(e) = result {
            warn!("Failed to write manifest {}: {}", path.display(), e);
        }
    }

    /// Delete an install directory created by this installer
    pub fn remove_install(&self, path: &Path) -> Result<()> {
        if !self.owns(path) {
            debug!("Not removing {}: outside {}", path.display(), self.downloaded_dir.display());
            return Ok(());
        }
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}

async fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = File::open(&archive)?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(&dest)?;
        Ok(())
    })
    .await
    .map_err(|e| PlusNotesError::Io(std::io::Error::other(e)))?
}

/// First `extension.json` anywhere in the tree, else the first loadable file
fn locate_package(root: &Path, discovery: &Discovery) -> Option<PackageSource> {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    if let Some(manifest) = files
        .iter()
        .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE))
    {
        return Some(PackageSource::Manifest(manifest.clone()));
    }

    files
        .into_iter()
        .find(|p| discovery.accepts(p))
        .map(PackageSource::Artifact)
}

fn package_descriptor(
    source: &PackageSource,
    discovery: &Discovery,
    fallback_id: Option<&str>,
) -> Result<ExtensionDescriptor> {
    let mut descriptor = match source {
        PackageSource::Manifest(path) => read_manifest(path)?,
        PackageSource::Artifact(path) => {
            let metadata = match discovery.load(path) {
                Ok((_, metadata)) => metadata,
                Err(e) => {
                    warn!("Cannot read metadata from {}: {}", path.display(), e);
                    let stem = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default();
                    ExtensionMetadata::new("", stem)
                }
            };
            ExtensionDescriptor::from_metadata(metadata, path.display().to_string())
        }
    };

    if descriptor.id.trim().is_empty() {
        descriptor.id = match fallback_id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        debug!("Package has no id, assigned {}", descriptor.id);
    }
    Ok(descriptor)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let src_path = entry.path();
        let Ok(relative) = src_path.strip_prefix(src) else {
            continue;
        };
        if relative.components().any(|c| c.as_os_str() == ".git") {
            continue;
        }

        let dst_path = dst.join(relative);
        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
        } else if src_path.is_file() {
            if let Some(parent) = dst_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(src_path, &dst_path)?;
        }
    }

    Ok(())
}
