//! Extensions compiled into the application
//!
//! Registered before discovery runs, never removable.

pub mod organizer;
pub mod sync;
pub mod templates;

pub use organizer::{AutoOrganizerExtension, ORGANIZER_ID};
pub use sync::{SyncConfig, SyncExtension, SyncResult, SYNC_ID};
pub use templates::{NoteTemplate, TemplatesExtension, TEMPLATES_ID};

use crate::extension::DynExtension;
use crate::paths::AppPaths;

/// Fresh instances of every built-in, in registration order
pub fn all(paths: &AppPaths) -> Vec<DynExtension> {
    vec![
        Box::new(TemplatesExtension::new(paths.templates_dir())),
        Box::new(AutoOrganizerExtension::new()),
        Box::new(SyncExtension::new(paths.sync_config_file())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Extension;
    use std::path::PathBuf;

    #[test]
    fn test_built_in_ids() {
        let paths = AppPaths::with_root(PathBuf::from("/tmp/plusnotes-test"));
        let ids: Vec<String> = all(&paths).iter().map(|e| e.metadata().id).collect();

        assert_eq!(ids, vec![TEMPLATES_ID, ORGANIZER_ID, SYNC_ID]);
    }
}
