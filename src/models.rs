use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub filename: String,
    pub description: Option<String>,
    /// 0 or `None` means unrated.
    pub rating: Option<u8>,
    pub tags: Vec<String>,
    pub duration: Option<f64>,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub thumbnail_path: Option<String>,
    pub added_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Video {
    /// Looks up a sortable property by name. Unknown fields and absent
    /// optional values both yield `None`.
    pub fn sort_value(&self, field: &str) -> Option<SortValue<'_>> {
        match field {
            "id" => Some(SortValue::Integer(self.id)),
            "path" => Some(SortValue::Text(&self.path)),
            "title" => Some(SortValue::Text(&self.title)),
            "filename" => Some(SortValue::Text(&self.filename)),
            "description" => self.description.as_deref().map(SortValue::Text),
            "rating" => self.rating.map(|r| SortValue::Integer(i64::from(r))),
            "duration" => self.duration.map(SortValue::Float),
            "size" => Some(SortValue::Size(self.size)),
            "width" => self.width.map(|w| SortValue::Integer(i64::from(w))),
            "height" => self.height.map(|h| SortValue::Integer(i64::from(h))),
            "added_at" | "addedAt" => Some(SortValue::Date(self.added_at)),
            "modified_at" | "modifiedAt" => self.modified_at.map(SortValue::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortValue<'a> {
    Text(&'a str),
    Integer(i64),
    Size(u64),
    Float(f64),
    Date(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub path: String,
    pub name: String,
    pub scan_depth: usize,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    /// 0 disables the rating filter.
    pub rating_threshold: u8,
    pub selected_tags: BTreeSet<String>,
    /// Empty means nothing is visible, unlike the tag and rating filters.
    pub selected_directories: BTreeSet<String>,
    pub search_query: String,
    pub persistence_enabled: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            rating_threshold: 0,
            selected_tags: BTreeSet::new(),
            selected_directories: BTreeSet::new(),
            search_query: String::new(),
            persistence_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub field: String,
    pub order: SortOrder,
}

impl SortState {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

impl Default for SortState {
    fn default() -> Self {
        Self::new("title", SortOrder::Asc)
    }
}

/// A video file found on disk, before it has a catalog identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedVideo {
    pub path: String,
    pub filename: String,
    pub title: String,
    pub folder_path: String,
    pub size: u64,
    pub thumbnail_path: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_videos: usize,
    pub new_videos: usize,
    pub removed_videos: usize,
}
