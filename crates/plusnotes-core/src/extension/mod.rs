//! Extension system
//!
//! ```text
//! ExtensionManager
//!   ├── ExtensionRegistry   available extensions + persisted enabled-set
//!   ├── Discovery           folder scan through ExtensionLoaders
//!   ├── lifecycle           enable / disable / startup / shutdown
//!   ├── PackageInstaller    zip + single-artifact installs into Downloaded/
//!   ├── RemoteFetcher       repository archives, branches, remote versions
//!   └── update / version    rate-limited update checks, loose comparison
//! ```

pub mod discovery;
pub mod fetcher;
pub mod installer;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod types;
pub mod update;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use discovery::{DiscoveredExtension, Discovery, DiscoveryReport, SkippedArtifact, MANIFEST_FILE};
pub use fetcher::{RemoteFetcher, RemoteRelease, RepositoryRef};
pub use installer::{compute_file_hash, compute_hash, PackageInstaller};
pub use loader::{
    is_native_library, ExtensionFactory, ExtensionLoader, FactoryLoader, NativeLoader, ABI_VERSION,
};
pub use manager::{ExtensionManager, StartupReport};
pub use registry::{ExtensionRegistry, RegisteredExtension};
pub use types::{
    BatchOutcome, DynExtension, Extension, ExtensionDescriptor, ExtensionMetadata, UpdateCheck,
};
