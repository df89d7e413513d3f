pub mod discovery;
pub mod indexer;
pub mod path_filter;
pub mod persistence;
pub mod watcher;

pub use discovery::{FileFilter, EXCLUDED_DIRS, SUPPORTED_EXTENSIONS};
pub use indexer::{IncrementalIndexer, IndexStats, UpdateSummary};
pub use path_filter::PathFilter;
pub use persistence::{FileRecord, IndexCache, LexicalSnapshot};
pub use watcher::{FileChange, FileWatcher};
