//! Discovery Engine
//!
//! Scans one folder (non-recursively) for loadable artifacts and turns each
//! into a descriptor plus live instance. A folder carrying an
//! `extension.json` manifest is an installed package: the manifest supplies
//! the id and the update-tracking fields.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PlusNotesError, Result};
use crate::extension::loader::{ExtensionLoader, FactoryLoader, NativeLoader};
use crate::extension::types::{DynExtension, Extension, ExtensionDescriptor, ExtensionMetadata};

/// Manifest written next to every installed package
pub const MANIFEST_FILE: &str = "extension.json";

/// One successfully loaded extension
pub struct DiscoveredExtension {
    pub descriptor: ExtensionDescriptor,
    pub instance: Option<DynExtension>,
}

/// An artifact that could not be turned into an extension
#[derive(Debug)]
pub struct SkippedArtifact {
    pub path: PathBuf,
    pub error: PlusNotesError,
}

#[derive(Default)]
pub struct DiscoveryReport {
    pub found: Vec<DiscoveredExtension>,
    pub skipped: Vec<SkippedArtifact>,
}

/// Discovery Engine - owns the loaders and applies them to folders
pub struct Discovery {
    loaders: Vec<Box<dyn ExtensionLoader>>,
}

/// Native libraries only: the factory catalog is empty, so `.extension`
/// files are reported as skipped. Embedders with in-process extensions pass
/// their catalog through [`Discovery::new`].
impl Default for Discovery {
    fn default() -> Self {
        Self::new(FactoryLoader::new())
    }
}

impl Discovery {
    /// Native libraries plus the given factory-backed files
    pub fn new(factories: FactoryLoader) -> Self {
        Self::empty()
            .with_loader(NativeLoader::new())
            .with_loader(factories)
    }

    /// No loaders at all; every artifact is ignored
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    pub fn with_loader(mut self, loader: impl ExtensionLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    /// Whether any loader handles this file
    pub fn accepts(&self, path: &Path) -> bool {
        self.loaders.iter().any(|l| l.accepts(path))
    }

    /// Load one artifact and read its metadata.
    ///
    /// A panicking constructor or `metadata()` is reported as `LoadFailed`.
    pub fn load(&self, path: &Path) -> Result<(DynExtension, ExtensionMetadata)> {
        let loader = self
            .loaders
            .iter()
            .find(|l| l.accepts(path))
            .ok_or_else(|| PlusNotesError::LoadFailed {
                path: path.to_path_buf(),
                message: "no loader for this file type".to_string(),
            })?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let instance = loader.load(path)?;
            let metadata = instance.metadata();
            Ok((instance, metadata))
        }));

        match outcome {
            Ok(result) => result,
            Err(_) => Err(PlusNotesError::LoadFailed {
                path: path.to_path_buf(),
                message: "extension panicked while loading".to_string(),
            }),
        }
    }

    /// Scan `folder` for extensions.
    ///
    /// A missing folder yields an empty report. Artifacts are visited in
    /// file-name order and failures never abort the scan.
    pub fn discover(&self, folder: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        if !folder.is_dir() {
            debug!("Extensions folder does not exist: {}", folder.display());
            return report;
        }

        let entries = match fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read extensions folder {}: {}", folder.display(), e);
                return report;
            }
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.accepts(p))
            .collect();
        candidates.sort();

        let manifest_path = folder.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            match read_manifest(&manifest_path) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!("Ignoring manifest {}: {}", manifest_path.display(), e);
                    report.skipped.push(SkippedArtifact {
                        path: manifest_path.clone(),
                        error: e,
                    });
                    None
                }
            }
        } else {
            None
        };

        let owner = manifest
            .as_ref()
            .and_then(|m| manifest_owner(&candidates, m))
            .cloned();

        for path in &candidates {
            let (instance, metadata) = match self.load(path) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    report.skipped.push(SkippedArtifact {
                        path: path.clone(),
                        error: e,
                    });
                    continue;
                }
            };

            let mut descriptor =
                ExtensionDescriptor::from_metadata(metadata, path.display().to_string());
            if let Some(manifest) = &manifest {
                let owns = owner.as_ref() == Some(path);
                apply_manifest(&mut descriptor, manifest, folder, owns);
            }

            if descriptor.id.trim().is_empty() {
                warn!("Skipping {}: extension reported an empty id", path.display());
                report.skipped.push(SkippedArtifact {
                    path: path.clone(),
                    error: PlusNotesError::LoadFailed {
                        path: path.clone(),
                        message: "extension reported an empty id".to_string(),
                    },
                });
                continue;
            }

            debug!("Discovered {} at {}", descriptor.id, path.display());
            report.found.push(DiscoveredExtension {
                descriptor,
                instance: Some(instance),
            });
        }

        // A package without any loadable artifact is still listed
        if candidates.is_empty() {
            if let Some(manifest) = manifest {
                if manifest.id.trim().is_empty() {
                    warn!("Ignoring manifest without id: {}", manifest_path.display());
                } else {
                    let mut descriptor = manifest;
                    descriptor.source_location = manifest_path.display().to_string();
                    descriptor.install_path = Some(folder.to_path_buf());
                    descriptor.is_built_in = false;
                    descriptor.is_initialized = false;
                    report.found.push(DiscoveredExtension {
                        descriptor,
                        instance: None,
                    });
                }
            }
        }

        report
    }
}

/// Parse an `extension.json` manifest
pub fn read_manifest(path: &Path) -> Result<ExtensionDescriptor> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| PlusNotesError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// The artifact a package manifest describes: the one its `sourceLocation`
/// names, else the first candidate.
fn manifest_owner<'a>(
    candidates: &'a [PathBuf],
    manifest: &ExtensionDescriptor,
) -> Option<&'a PathBuf> {
    let named = Path::new(&manifest.source_location).file_name();
    candidates
        .iter()
        .find(|p| named.is_some() && p.file_name() == named)
        .or_else(|| candidates.first())
}

/// Stamp package data onto a loaded artifact.
///
/// Only the owning artifact takes the manifest's id and update tracking,
/// and its own metadata still wins for everything else it reports.
/// Siblings keep their own ids.
fn apply_manifest(
    descriptor: &mut ExtensionDescriptor,
    manifest: &ExtensionDescriptor,
    folder: &Path,
    owner: bool,
) {
    descriptor.install_path = Some(folder.to_path_buf());
    descriptor.last_updated = manifest.last_updated;
    descriptor.package_sha256 = manifest.package_sha256.clone();
    if !owner {
        return;
    }

    if !manifest.id.trim().is_empty() {
        descriptor.id = manifest.id.clone();
    }
    if descriptor.name.is_empty() {
        descriptor.name = manifest.name.clone();
    }
    if descriptor.version.is_none() {
        descriptor.version = manifest.version.clone();
    }
    if descriptor.description.is_none() {
        descriptor.description = manifest.description.clone();
    }
    if descriptor.author.is_none() {
        descriptor.author = manifest.author.clone();
    }
    descriptor.repository_url = manifest.repository_url.clone();
}
