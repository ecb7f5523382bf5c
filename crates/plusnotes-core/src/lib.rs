pub mod app_update;
pub mod builtin;
pub mod config;
pub mod error;
pub mod extension;
pub mod notes;
pub mod paths;

pub use app_update::{AppUpdateStatus, AppUpdater, UpdateInfo};
pub use config::{Config, NetworkConfig, UpdatesConfig};
pub use error::{PlusNotesError, Result};
pub use paths::AppPaths;

pub use extension::{
    BatchOutcome, Discovery, DynExtension, Extension, ExtensionDescriptor, ExtensionLoader,
    ExtensionManager, ExtensionMetadata, FactoryLoader, RemoteFetcher, StartupReport, UpdateCheck,
};
pub use notes::{search_notes, JsonNoteStore, Note, NoteStore};

// Built-in extensions
pub use builtin::{AutoOrganizerExtension, NoteTemplate, SyncExtension, TemplatesExtension};
