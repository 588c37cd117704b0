mod backup;
mod events;
mod fs_utils;
mod install;
mod roots;
mod source;
mod updater;

pub use backup::{standard_chain, BackupStrategy, SkipUpdated, SuffixBackup};
pub use events::{EventSink, FnSink, NullSink, UpdateEvent};
pub use fs_utils::{prune_empty_ancestors, remove_file_if_exists};
pub use install::{AcceptAll, InstallHooks, InstallState, Installer};
pub use roots::find_roots;
pub use source::{open_package_source, ArchiveSource, ContentSource, DirSource};
pub use updater::{plan_update, SourceFactory, UpdateOutcome, UpdatePlan, Updater};
