//! Filtering and sorting of the in-memory video collection.
//!
//! Stages run in a fixed order (rating, search, tags, directories, sort) and
//! each stage only sees the survivors of the previous one. Nothing here
//! mutates its inputs, so calling [`apply`] repeatedly with the same
//! arguments always produces the same ordering.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::models::{FilterState, SortOrder, SortState, SortValue, Video, MAX_RATING};

pub fn apply<'a>(videos: &'a [Video], filter: &FilterState, sort: &SortState) -> Vec<&'a Video> {
    let mut visible: Vec<&Video> = videos.iter().collect();

    let threshold = filter.rating_threshold.min(MAX_RATING);
    if threshold > 0 {
        visible.retain(|v| v.rating.unwrap_or(0) >= threshold);
    }

    let query = filter.search_query.trim().to_lowercase();
    if !query.is_empty() {
        visible.retain(|v| matches_search(v, &query));
    }

    if !filter.selected_tags.is_empty() {
        visible.retain(|v| has_any_tag(v, &filter.selected_tags));
    }

    if filter.selected_directories.is_empty() {
        return Vec::new();
    }
    let directories: Vec<String> = filter
        .selected_directories
        .iter()
        .map(|d| normalize_path(d))
        .collect();
    visible.retain(|v| {
        let path = normalize_path(&v.path);
        directories.iter().any(|dir| is_in_directory(&path, dir))
    });

    // sort_by is stable, so equal keys keep their incoming order.
    visible.sort_by(|a, b| compare_videos(a, b, sort));
    visible
}

/// Case-insensitive substring match. `query` must already be lowercased.
pub fn matches_search(video: &Video, query: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(query);
    hit(video.title.as_str())
        || hit(video.filename.as_str())
        || video.description.as_deref().is_some_and(hit)
        || video.tags.iter().any(|t| hit(t.as_str()))
}

fn has_any_tag(video: &Video, selected: &BTreeSet<String>) -> bool {
    video.tags.iter().any(|t| selected.contains(t))
}

/// Forward slashes only, no repeated or trailing separators (roots keep theirs).
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    while out.len() > 1 && out.ends_with('/') && !out.ends_with(":/") {
        out.pop();
    }
    out
}

/// Both arguments must be normalized with [`normalize_path`]. Matches whole
/// path segments only: `/movies/abc/x.mp4` is not inside `/movies/ab`.
pub fn is_in_directory(video_path: &str, directory: &str) -> bool {
    if let Some((parent, _)) = video_path.rsplit_once('/') {
        if parent == directory {
            return true;
        }
    }
    if directory.ends_with('/') {
        video_path.starts_with(directory)
    } else {
        video_path.len() > directory.len()
            && video_path.starts_with(directory)
            && video_path.as_bytes()[directory.len()] == b'/'
    }
}

/// Absent values sort after present ones in ascending order; descending
/// reverses the whole result, absent values included.
pub fn compare_videos(a: &Video, b: &Video, sort: &SortState) -> Ordering {
    let ord = compare_values(a.sort_value(&sort.field), b.sort_value(&sort.field));
    match sort.order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

fn compare_values(a: Option<SortValue<'_>>, b: Option<SortValue<'_>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_present(a, b),
    }
}

fn compare_present(a: SortValue<'_>, b: SortValue<'_>) -> Ordering {
    match (a, b) {
        (SortValue::Text(a), SortValue::Text(b)) => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
        (SortValue::Date(a), SortValue::Date(b)) => a.cmp(&b),
        (SortValue::Size(a), SortValue::Size(b)) => a.cmp(&b),
        (SortValue::Integer(a), SortValue::Integer(b)) => a.cmp(&b),
        (a, b) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            // Mixed kinds have no meaningful order.
            _ => Ordering::Equal,
        },
    }
}

fn as_number(value: SortValue<'_>) -> Option<f64> {
    match value {
        SortValue::Integer(n) => Some(n as f64),
        SortValue::Size(n) => Some(n as f64),
        SortValue::Float(n) => Some(n),
        SortValue::Text(_) | SortValue::Date(_) => None,
    }
}
