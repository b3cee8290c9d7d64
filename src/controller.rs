use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::catalog::{Catalog, Library};
use crate::config::AppConfig;
use crate::engine;
use crate::error::Result;
use crate::filter_store::FilterStateStore;
use crate::models::{Directory, ScanSummary, SortOrder, SortState, Video};
use crate::storage::{KeyValueStore, SqliteStore};

pub const SORT_FIELD_KEY: &str = "sortField";
pub const SORT_ORDER_KEY: &str = "sortOrder";

/// Top-level owner of the library, the filter selection and the sort order.
pub struct LibraryController<L: Library, S: KeyValueStore + Clone> {
    library: L,
    prefs: S,
    filters: FilterStateStore<S>,
    sort: SortState,
    videos: Vec<Video>,
    directories: Vec<Directory>,
    default_scan_depth: usize,
}

impl LibraryController<Catalog, SqliteStore> {
    /// Opens the on-disk catalog and preferences named by `config`.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let catalog = Catalog::open(&config.catalog_db_path())?
            .with_extensions(config.video_extensions.clone());
        let prefs = SqliteStore::open(&config.prefs_db_path())?;
        let mut controller = Self::with_options(
            catalog,
            prefs,
            config.default_scan_depth,
            config.persist_filters_default,
        );
        controller.refresh()?;
        info!("opened library in {}", config.data_dir.display());
        Ok(controller)
    }
}

impl<L: Library, S: KeyValueStore + Clone> LibraryController<L, S> {
    pub fn new(library: L, prefs: S) -> Self {
        Self::with_options(library, prefs, 2, true)
    }

    pub fn with_options(library: L, prefs: S, default_scan_depth: usize, persist_filters_default: bool) -> Self {
        let filters = FilterStateStore::with_persistence_default(prefs.clone(), persist_filters_default);
        let sort = load_sort(&prefs);
        Self {
            library,
            prefs,
            filters,
            sort,
            videos: Vec::new(),
            directories: Vec::new(),
            default_scan_depth,
        }
    }

    /// Reloads videos and directories and reconciles the directory filter.
    pub fn refresh(&mut self) -> Result<()> {
        self.directories = self.library.list_directories()?;
        self.videos = self.library.list_videos()?;
        self.filters.reconcile_directories(&self.directories);
        Ok(())
    }

    pub fn add_directory(&mut self, path: &str) -> Result<ScanSummary> {
        self.library.add_directory(path, self.default_scan_depth)?;
        let summary = self.library.scan_directory(path)?;
        self.refresh()?;
        Ok(summary)
    }

    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.library.remove_directory(path)?;
        self.refresh()
    }

    pub fn rescan_directory(&mut self, path: &str) -> Result<ScanSummary> {
        let summary = self.library.scan_directory(path)?;
        self.refresh()?;
        Ok(summary)
    }

    pub fn visible(&self) -> Vec<&Video> {
        engine::apply(&self.videos, self.filters.state(), &self.sort)
    }

    pub fn select_all_directories(&mut self) {
        self.filters.select_all_directories(&self.directories);
    }

    pub fn set_sort(&mut self, field: &str, order: SortOrder) {
        self.sort = SortState::new(field, order);
        for (key, value) in [(SORT_FIELD_KEY, field), (SORT_ORDER_KEY, order.as_str())] {
            if let Err(e) = self.prefs.set(key, value) {
                warn!("dropped write to {}: {}", key, e);
            }
        }
    }

    /// Distinct tags across all videos, sorted.
    pub fn available_tags(&self) -> Vec<String> {
        let tags: BTreeSet<&str> = self
            .videos
            .iter()
            .flat_map(|v| v.tags.iter().map(String::as_str))
            .collect();
        tags.into_iter().map(str::to_string).collect()
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    pub fn filters(&self) -> &FilterStateStore<S> {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterStateStore<S> {
        &mut self.filters
    }

    pub fn library(&self) -> &L {
        &self.library
    }
}

fn load_sort<S: KeyValueStore>(prefs: &S) -> SortState {
    let mut sort = SortState::default();
    match prefs.get(SORT_FIELD_KEY) {
        Ok(Some(field)) if !field.trim().is_empty() => sort.field = field,
        Ok(_) => {}
        Err(e) => warn!("could not read {}: {}", SORT_FIELD_KEY, e),
    }
    match prefs.get(SORT_ORDER_KEY) {
        Ok(Some(order)) => match SortOrder::parse(&order) {
            Some(order) => sort.order = order,
            None => warn!("ignoring unknown {} `{}`", SORT_ORDER_KEY, order),
        },
        Ok(None) => {}
        Err(e) => warn!("could not read {}: {}", SORT_ORDER_KEY, e),
    }
    sort
}
