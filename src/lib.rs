pub mod catalog;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod filter_store;
pub mod logging;
pub mod models;
pub mod scanner;
pub mod storage;

pub use catalog::{Catalog, Library};
pub use config::{load_config, AppConfig};
pub use controller::LibraryController;
pub use error::{Error, Result};
pub use filter_store::FilterStateStore;
pub use logging::init_logging;
pub use models::{Directory, FilterState, SortOrder, SortState, Video};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
