use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::models::ScannedVideo;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "webm", "mov", "wmv", "flv", "m4v", "mpg", "mpeg", "3gp", "ts",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

const SKIPPED_DIRS: &[&str] = &["node_modules", "Library", "$RECYCLE.BIN"];

/// Result of walking one watched directory.
#[derive(Debug, Default)]
pub struct DirectoryScan {
    pub videos: Vec<ScannedVideo>,
    /// Paths that could not be read. Catalog entries under them must not be
    /// treated as vanished.
    pub unreadable: Vec<String>,
}

/// Walk `root` down to `max_depth` nested folders and collect video files.
/// Hidden entries are skipped and symlinks are not followed. Fails when the
/// root itself cannot be read.
pub fn scan_directory<S: AsRef<str>>(root: &str, max_depth: usize, extensions: &[S]) -> Result<DirectoryScan> {
    let walker = WalkDir::new(root)
        .max_depth(max_depth + 1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

    let mut scan = DirectoryScan::default();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                warn!("cannot read {}: {}", root, e);
                return Err(Error::Io(e.into()));
            }
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root, e);
                let path = e.path().map_or_else(|| root.to_string(), |p| p.to_string_lossy().to_string());
                scan.unreadable.push(path);
                continue;
            }
        };
        if entry.depth() == 0 {
            if !entry.file_type().is_dir() {
                return Err(Error::InvalidPath(root.to_string()));
            }
            continue;
        }
        if !entry.file_type().is_file() || !has_video_extension(entry.path(), extensions) {
            continue;
        }
        match scanned_from_path(entry.path()) {
            Some(video) => scan.videos.push(video),
            None => scan.unreadable.push(entry.path().to_string_lossy().to_string()),
        }
    }
    debug!(
        "scanned {}: {} videos, {} unreadable",
        root,
        scan.videos.len(),
        scan.unreadable.len()
    );
    Ok(scan)
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}

fn has_video_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| e.as_ref().eq_ignore_ascii_case(&ext)))
}

pub fn scanned_from_path(path: &Path) -> Option<ScannedVideo> {
    let filename = path.file_name()?.to_string_lossy().to_string();
    let title = path.file_stem()?.to_string_lossy().to_string();
    let folder_path = path.parent()?.to_string_lossy().to_string();
    let metadata = std::fs::metadata(path).ok()?;
    let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);

    Some(ScannedVideo {
        path: path.to_string_lossy().to_string(),
        filename,
        title,
        folder_path,
        size: metadata.len(),
        thumbnail_path: find_thumbnail_for_video(path),
        modified_at,
    })
}

/// A sibling image with the same stem counts as the video's thumbnail.
pub fn find_thumbnail_for_video(video_path: &Path) -> Option<String> {
    let stem = video_path.file_stem()?;
    let parent = video_path.parent()?;

    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| parent.join(format!("{}.{}", stem.to_string_lossy(), ext)))
        .find(|p| p.exists())
        .map(|p| p.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn finds_videos_within_depth_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.mp4"));
        touch(&root.join("notes.txt"));
        touch(&root.join("Show").join("B.MKV"));
        touch(&root.join("Show").join("S1").join("c.avi"));
        touch(&root.join(".hidden").join("d.mp4"));
        touch(&root.join(".e.mp4"));

        let root_str = root.to_string_lossy().to_string();
        let shallow = scan_directory(&root_str, 0, VIDEO_EXTENSIONS).unwrap();
        assert!(shallow.unreadable.is_empty());
        let names: Vec<_> = shallow.videos.iter().map(|v| v.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp4"]);

        let deep = scan_directory(&root_str, 2, VIDEO_EXTENSIONS).unwrap();
        let mut names: Vec<_> = deep.videos.iter().map(|v| v.filename.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["B.MKV", "a.mp4", "c.avi"]);
    }

    #[test]
    fn derives_title_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("My Clip.mp4");
        touch(&video);
        touch(&dir.path().join("My Clip.png"));

        let scanned = scanned_from_path(&video).unwrap();
        assert_eq!(scanned.title, "My Clip");
        assert_eq!(scanned.size, 4);
        assert!(scanned.modified_at.is_some());
        assert!(scanned.thumbnail_path.unwrap().ends_with("My Clip.png"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("unmounted").to_string_lossy().to_string();
        assert!(matches!(scan_directory(&gone, 2, VIDEO_EXTENSIONS), Err(Error::Io(_))));

        let file = dir.path().join("a.mp4");
        touch(&file);
        let file = file.to_string_lossy().to_string();
        assert!(matches!(scan_directory(&file, 2, VIDEO_EXTENSIONS), Err(Error::InvalidPath(_))));
    }
}
