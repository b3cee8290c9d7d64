//! Owner of the active filter selection and its persisted form.
//!
//! Every mutation is flushed to the [`KeyValueStore`] (when persistence is
//! enabled) and then reported to the registered observer. Storage failures
//! are logged and swallowed; the in-memory state stays authoritative.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Directory, FilterState, MAX_RATING};
use crate::storage::KeyValueStore;

pub const FILTER_STATE_KEY: &str = "filterState";
pub const SAVE_FILTER_STATE_KEY: &str = "saveFilterState";
pub const SEARCH_QUERY_KEY: &str = "searchQuery";

type Observer = Box<dyn FnMut(&FilterState)>;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedFilters {
    #[serde(default)]
    rating: i64,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    directories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    known_directories: Option<Vec<String>>,
    #[serde(default)]
    directories_cleared: bool,
}

pub struct FilterStateStore<S: KeyValueStore> {
    storage: S,
    state: FilterState,
    /// Directory paths seen by the last reconciliation, used to tell newly
    /// registered directories apart from ones the user deselected.
    known_directories: Option<BTreeSet<String>>,
    /// Set by an explicit deselect-all; keeps the empty selection empty until
    /// the user selects something again.
    directories_cleared: bool,
    has_saved_state: bool,
    reconciled: bool,
    observer: Option<Observer>,
}

impl<S: KeyValueStore> FilterStateStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_persistence_default(storage, true)
    }

    /// `persist_by_default` applies when `saveFilterState` was never written.
    pub fn with_persistence_default(storage: S, persist_by_default: bool) -> Self {
        let mut store = Self {
            storage,
            state: FilterState::default(),
            known_directories: None,
            directories_cleared: false,
            has_saved_state: false,
            reconciled: false,
            observer: None,
        };
        store.state.persistence_enabled = store.read_persistence_flag(persist_by_default);
        if store.state.persistence_enabled {
            store.restore();
        }
        store
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Registers the single observer, replacing any previous one.
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: FnMut(&FilterState) + 'static,
    {
        self.observer = Some(Box::new(callback));
    }

    pub fn set_rating_threshold(&mut self, value: i32) {
        self.state.rating_threshold = value.clamp(0, i32::from(MAX_RATING)) as u8;
        self.commit();
    }

    pub fn toggle_tag(&mut self, name: &str) {
        if !self.state.selected_tags.remove(name) {
            self.state.selected_tags.insert(name.to_string());
        }
        self.commit();
    }

    pub fn clear_all_tag_filters(&mut self) {
        self.state.selected_tags.clear();
        self.commit();
    }

    pub fn toggle_directory(&mut self, path: &str) {
        if !self.state.selected_directories.remove(path) {
            self.state.selected_directories.insert(path.to_string());
        }
        self.directories_cleared = false;
        self.commit();
    }

    pub fn select_all_directories(&mut self, known: &[Directory]) {
        self.state.selected_directories = known.iter().map(|d| d.path.clone()).collect();
        self.directories_cleared = false;
        self.commit();
    }

    pub fn deselect_all_directories(&mut self) {
        self.state.selected_directories.clear();
        self.directories_cleared = true;
        self.commit();
    }

    pub fn update_search_query(&mut self, text: impl Into<String>) {
        self.state.search_query = text.into();
        if self.state.persistence_enabled {
            self.write(SEARCH_QUERY_KEY, &self.state.search_query);
        }
        self.notify();
    }

    /// Brings the directory selection in line with the currently known
    /// directories. Call after every add, remove, or initial load.
    pub fn reconcile_directories(&mut self, known: &[Directory]) {
        let known: BTreeSet<String> = known.iter().map(|d| d.path.clone()).collect();
        let selected = &mut self.state.selected_directories;

        let before = selected.len();
        selected.retain(|p| known.contains(p));
        let pruned = before - selected.len();

        if !self.state.persistence_enabled {
            *selected = known.clone();
            self.directories_cleared = false;
        } else if !self.reconciled && !self.has_saved_state && selected.is_empty() {
            debug!("first run, selecting all {} directories", known.len());
            *selected = known.clone();
        } else if !self.directories_cleared {
            let seen = self.known_directories.as_ref();
            for path in &known {
                if seen.map_or(true, |s| !s.contains(path)) && selected.insert(path.clone()) {
                    debug!("auto-selecting new directory {}", path);
                }
            }
        }

        if pruned > 0 {
            debug!("pruned {} stale directories from filter", pruned);
        }
        self.known_directories = Some(known);
        self.reconciled = true;
        self.commit();
    }

    /// Disabling deletes the persisted filters at once; enabling writes the
    /// current state so the next session starts from it.
    pub fn set_persistence_enabled(&mut self, enabled: bool) {
        self.state.persistence_enabled = enabled;
        self.write(SAVE_FILTER_STATE_KEY, if enabled { "true" } else { "false" });
        if enabled {
            self.persist();
            self.write(SEARCH_QUERY_KEY, &self.state.search_query);
        } else {
            self.delete(FILTER_STATE_KEY);
            self.delete(SEARCH_QUERY_KEY);
            self.has_saved_state = false;
        }
        self.notify();
    }

    fn commit(&mut self) {
        self.persist();
        self.notify();
    }

    fn notify(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.state);
        }
    }

    fn persist(&mut self) {
        if !self.state.persistence_enabled {
            return;
        }
        let blob = PersistedFilters {
            rating: i64::from(self.state.rating_threshold),
            tags: self.state.selected_tags.iter().cloned().collect(),
            directories: self.state.selected_directories.iter().cloned().collect(),
            known_directories: self
                .known_directories
                .as_ref()
                .map(|k| k.iter().cloned().collect()),
            directories_cleared: self.directories_cleared,
        };
        match serde_json::to_string(&blob) {
            Ok(json) => {
                if self.write(FILTER_STATE_KEY, &json) {
                    self.has_saved_state = true;
                }
            }
            Err(e) => warn!("failed to encode filter state: {}", e),
        }
    }

    fn restore(&mut self) {
        match self.storage.get(FILTER_STATE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedFilters>(&raw) {
                Ok(saved) => {
                    self.state.rating_threshold = saved.rating.clamp(0, i64::from(MAX_RATING)) as u8;
                    self.state.selected_tags = saved.tags.into_iter().collect();
                    self.state.selected_directories = saved.directories.into_iter().collect();
                    self.known_directories = saved.known_directories.map(|k| k.into_iter().collect());
                    self.directories_cleared = saved.directories_cleared;
                    self.has_saved_state = true;
                }
                Err(e) => {
                    warn!("discarding corrupt {}: {}", FILTER_STATE_KEY, e);
                    self.delete(FILTER_STATE_KEY);
                }
            },
            Ok(None) => {}
            Err(e) => warn!("could not read {}: {}", FILTER_STATE_KEY, e),
        }

        match self.storage.get(SEARCH_QUERY_KEY) {
            Ok(Some(query)) => self.state.search_query = query,
            Ok(None) => {}
            Err(e) => warn!("could not read {}: {}", SEARCH_QUERY_KEY, e),
        }
    }

    fn read_persistence_flag(&self, default: bool) -> bool {
        match self.storage.get(SAVE_FILTER_STATE_KEY) {
            Ok(Some(v)) => v.trim() != "false",
            Ok(None) => default,
            Err(e) => {
                warn!("could not read {}: {}", SAVE_FILTER_STATE_KEY, e);
                default
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> bool {
        match self.storage.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("dropped write to {}: {}", key, e);
                false
            }
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!("could not remove {}: {}", key, e);
        }
    }
}
