use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::engine::{is_in_directory, normalize_path};
use crate::error::{Error, Result};
use crate::models::*;
use crate::scanner;

/// Host-side source of videos and watched directories.
pub trait Library {
    fn list_videos(&self) -> Result<Vec<Video>>;
    fn list_directories(&self) -> Result<Vec<Directory>>;
    fn add_directory(&self, path: &str, scan_depth: usize) -> Result<Directory>;
    fn remove_directory(&self, path: &str) -> Result<()>;
    fn scan_directory(&self, path: &str) -> Result<ScanSummary>;
}

const VIDEO_COLUMNS: &str = "id, path, title, filename, description, rating, duration, size, width, height, thumbnail_path, added_at, modified_at";

pub struct Catalog {
    conn: Mutex<Connection>,
    extensions: Vec<String>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let catalog = Catalog {
            conn: Mutex::new(conn),
            extensions: scanner::VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        };
        catalog.init_tables()?;
        Ok(catalog)
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS directories (
                path TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                scan_depth INTEGER NOT NULL DEFAULT 2,
                added_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                filename TEXT NOT NULL,
                folder_path TEXT NOT NULL,
                description TEXT,
                rating INTEGER,
                duration REAL,
                size INTEGER NOT NULL DEFAULT 0,
                width INTEGER,
                height INTEGER,
                thumbnail_path TEXT,
                added_at TEXT NOT NULL,
                modified_at TEXT
            );

            -- Tag names are case-sensitive; position keeps per-video order
            CREATE TABLE IF NOT EXISTS video_tags (
                video_id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (video_id, tag),
                FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_videos_folder ON videos(folder_path);
        "#)?;

        Ok(())
    }

    // ========== Directories ==========

    pub fn get_directory(&self, path: &str) -> Result<Option<Directory>> {
        let conn = self.conn()?;
        let dir = conn
            .query_row(
                "SELECT path, name, scan_depth, added_at FROM directories WHERE path = ?1",
                params![path],
                directory_from_row,
            )
            .optional()?;
        Ok(dir)
    }

    // ========== Videos ==========

    /// Inserts a scanned file or refreshes its file-level fields. Returns
    /// `true` when the path was not in the catalog before. Rating, tags,
    /// description and title of an existing entry are left alone.
    pub fn upsert_scanned(&self, video: &ScannedVideo) -> Result<bool> {
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM videos WHERE path = ?1", params![video.path], |row| row.get(0))
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    r#"UPDATE videos SET filename = ?1, folder_path = ?2, size = ?3,
                           thumbnail_path = ?4, modified_at = ?5
                       WHERE id = ?6"#,
                    params![
                        video.filename,
                        video.folder_path,
                        video.size,
                        video.thumbnail_path,
                        video.modified_at,
                        id,
                    ],
                )?;
                Ok(false)
            }
            None => {
                conn.execute(
                    r#"INSERT INTO videos (path, title, filename, folder_path, size, thumbnail_path, added_at, modified_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        video.path,
                        video.title,
                        video.filename,
                        video.folder_path,
                        video.size,
                        video.thumbnail_path,
                        Utc::now(),
                        video.modified_at,
                    ],
                )?;
                Ok(true)
            }
        }
    }

    pub fn get_video(&self, id: i64) -> Result<Option<Video>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS);
        let video = conn.query_row(&sql, params![id], video_from_row).optional()?;

        match video {
            Some(mut video) => {
                let mut stmt = conn.prepare("SELECT tag FROM video_tags WHERE video_id = ?1 ORDER BY position")?;
                video.tags = stmt
                    .query_map(params![id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(Some(video))
            }
            None => Ok(None),
        }
    }

    /// Ratings outside 0–5 are clamped; 0 clears the rating.
    pub fn set_rating(&self, id: i64, rating: i32) -> Result<()> {
        let rating = rating.clamp(0, i32::from(MAX_RATING));
        let stored = (rating > 0).then_some(rating);
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE videos SET rating = ?1 WHERE id = ?2", params![stored, id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("video {}", id)));
        }
        Ok(())
    }

    pub fn set_description(&self, id: i64, description: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE videos SET description = ?1 WHERE id = ?2",
            params![description, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("video {}", id)));
        }
        Ok(())
    }

    /// Replaces the video's tags. Duplicates are dropped, first occurrence wins.
    pub fn set_video_tags(&self, id: i64, tags: &[String]) -> Result<()> {
        let conn = self.conn()?;
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM videos WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("video {}", id)));
        }

        conn.execute("DELETE FROM video_tags WHERE video_id = ?1", params![id])?;
        let mut seen = HashSet::new();
        let unique: Vec<&String> = tags.iter().filter(|t| seen.insert(t.as_str())).collect();
        for (position, tag) in unique.into_iter().enumerate() {
            conn.execute(
                "INSERT INTO video_tags (video_id, tag, position) VALUES (?1, ?2, ?3)",
                params![id, tag, position as i64],
            )?;
        }
        Ok(())
    }

    pub fn delete_video(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn video_ids_inside(conn: &Connection, directory: &str) -> Result<Vec<(i64, String)>> {
        let dir = normalize_path(directory);
        let mut stmt = conn.prepare("SELECT id, path FROM videos")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter(|(_, path)| is_in_directory(&normalize_path(path), &dir))
            .collect())
    }
}

impl Library for Catalog {
    fn list_videos(&self) -> Result<Vec<Video>> {
        let conn = self.conn()?;

        let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
        let mut stmt = conn.prepare("SELECT video_id, tag FROM video_tags ORDER BY video_id, position")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (id, tag) = row?;
            tags.entry(id).or_default().push(tag);
        }

        let sql = format!("SELECT {} FROM videos ORDER BY id", VIDEO_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let videos = stmt
            .query_map([], video_from_row)?
            .map(|v| {
                v.map(|mut video| {
                    video.tags = tags.remove(&video.id).unwrap_or_default();
                    video
                })
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(videos)
    }

    fn list_directories(&self) -> Result<Vec<Directory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT path, name, scan_depth, added_at FROM directories ORDER BY name COLLATE NOCASE, path",
        )?;
        let dirs = stmt
            .query_map([], directory_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(dirs)
    }

    fn add_directory(&self, path: &str, scan_depth: usize) -> Result<Directory> {
        if path.trim().is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());

        {
            let conn = self.conn()?;
            conn.execute(
                r#"INSERT INTO directories (path, name, scan_depth, added_at) VALUES (?1, ?2, ?3, ?4)
                   ON CONFLICT(path) DO UPDATE SET scan_depth = excluded.scan_depth"#,
                params![path, name, scan_depth as i64, Utc::now()],
            )?;
        }
        info!("registered directory {}", path);

        self.get_directory(path)?
            .ok_or_else(|| Error::NotFound(format!("directory {}", path)))
    }

    fn remove_directory(&self, path: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM directories WHERE path = ?1", params![path])?;

        // Videos still covered by another registered directory stay.
        let remaining: Vec<String> = conn
            .prepare("SELECT path FROM directories")?
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|p| p.map(|p| normalize_path(&p)))
            .collect::<rusqlite::Result<_>>()?;
        let mut removed = 0;
        for (id, video_path) in Self::video_ids_inside(&conn, path)? {
            let video_path = normalize_path(&video_path);
            if remaining.iter().any(|dir| is_in_directory(&video_path, dir)) {
                continue;
            }
            conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
            removed += 1;
        }
        info!("removed directory {} and {} videos", path, removed);
        Ok(())
    }

    fn scan_directory(&self, path: &str) -> Result<ScanSummary> {
        let dir = self
            .get_directory(path)?
            .ok_or_else(|| Error::NotFound(format!("directory {}", path)))?;

        let scan = scanner::scan_directory(&dir.path, dir.scan_depth, self.extensions.as_slice())?;

        let mut summary = ScanSummary {
            total_videos: scan.videos.len(),
            ..ScanSummary::default()
        };
        for video in &scan.videos {
            if self.upsert_scanned(video)? {
                summary.new_videos += 1;
            }
        }

        let present: HashSet<&str> = scan.videos.iter().map(|v| v.path.as_str()).collect();
        let unreadable: Vec<String> = scan.unreadable.iter().map(|p| normalize_path(p)).collect();
        let conn = self.conn()?;
        for (id, video_path) in Self::video_ids_inside(&conn, &dir.path)? {
            if present.contains(video_path.as_str()) {
                continue;
            }
            let normalized = normalize_path(&video_path);
            if unreadable.iter().any(|p| *p == normalized || is_in_directory(&normalized, p)) {
                continue;
            }
            conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
            summary.removed_videos += 1;
        }

        debug!(
            "scan of {}: {} total, {} new, {} removed",
            dir.path, summary.total_videos, summary.new_videos, summary.removed_videos
        );
        Ok(summary)
    }
}

fn directory_from_row(row: &Row<'_>) -> rusqlite::Result<Directory> {
    Ok(Directory {
        path: row.get(0)?,
        name: row.get(1)?,
        scan_depth: row.get::<_, i64>(2)? as usize,
        added_at: row.get(3)?,
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        path: row.get(1)?,
        title: row.get(2)?,
        filename: row.get(3)?,
        description: row.get(4)?,
        rating: row.get(5)?,
        tags: Vec::new(),
        duration: row.get(6)?,
        size: row.get(7)?,
        width: row.get(8)?,
        height: row.get(9)?,
        thumbnail_path: row.get(10)?,
        added_at: row.get(11)?,
        modified_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanned(path: &str) -> ScannedVideo {
        let p = Path::new(path);
        ScannedVideo {
            path: path.to_string(),
            filename: p.file_name().unwrap().to_string_lossy().to_string(),
            title: p.file_stem().unwrap().to_string_lossy().to_string(),
            folder_path: p.parent().unwrap().to_string_lossy().to_string(),
            size: 100,
            thumbnail_path: None,
            modified_at: None,
        }
    }

    fn id_of(catalog: &Catalog, path: &str) -> i64 {
        catalog
            .list_videos()
            .unwrap()
            .into_iter()
            .find(|v| v.path == path)
            .unwrap()
            .id
    }

    #[test]
    fn upsert_keeps_identity_and_user_data() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(catalog.upsert_scanned(&scanned("/m/a.mp4")).unwrap());
        let id = id_of(&catalog, "/m/a.mp4");
        catalog.set_rating(id, 4).unwrap();
        catalog.set_video_tags(id, &["x".into(), "y".into(), "x".into()]).unwrap();
        catalog.set_description(id, Some("notes")).unwrap();

        let mut again = scanned("/m/a.mp4");
        again.size = 200;
        assert!(!catalog.upsert_scanned(&again).unwrap());

        let video = catalog.get_video(id).unwrap().unwrap();
        assert_eq!(video.size, 200);
        assert_eq!(video.rating, Some(4));
        assert_eq!(video.tags, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(video.description.as_deref(), Some("notes"));
        assert_eq!(catalog.list_videos().unwrap()[0].tags, video.tags);
    }

    #[test]
    fn rating_is_clamped_and_zero_clears() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert_scanned(&scanned("/m/a.mp4")).unwrap();
        let id = id_of(&catalog, "/m/a.mp4");
        catalog.set_rating(id, 11).unwrap();
        assert_eq!(catalog.get_video(id).unwrap().unwrap().rating, Some(5));
        catalog.set_rating(id, 0).unwrap();
        assert_eq!(catalog.get_video(id).unwrap().unwrap().rating, None);
        assert!(matches!(catalog.set_rating(999, 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn removing_a_directory_drops_only_its_videos() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.add_directory("/movies/ab", 2).unwrap();
        catalog.add_directory("/movies/abc", 2).unwrap();
        catalog.upsert_scanned(&scanned("/movies/ab/y.mp4")).unwrap();
        catalog.upsert_scanned(&scanned("/movies/ab/sub/z.mp4")).unwrap();
        catalog.upsert_scanned(&scanned("/movies/abc/x.mp4")).unwrap();

        catalog.remove_directory("/movies/ab").unwrap();

        let dirs = catalog.list_directories().unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].name, "abc");
        let paths: Vec<_> = catalog.list_videos().unwrap().into_iter().map(|v| v.path).collect();
        assert_eq!(paths, vec!["/movies/abc/x.mp4".to_string()]);
    }

    #[test]
    fn removing_a_nested_directory_keeps_videos_the_parent_covers() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.add_directory("/movies", 2).unwrap();
        catalog.add_directory("/movies/ab", 2).unwrap();
        catalog.upsert_scanned(&scanned("/movies/ab/y.mp4")).unwrap();
        catalog.upsert_scanned(&scanned("/movies/z.mp4")).unwrap();

        catalog.remove_directory("/movies/ab").unwrap();

        let dirs: Vec<_> = catalog.list_directories().unwrap().into_iter().map(|d| d.path).collect();
        assert_eq!(dirs, vec!["/movies".to_string()]);
        assert_eq!(catalog.list_videos().unwrap().len(), 2);

        catalog.remove_directory("/movies").unwrap();
        assert!(catalog.list_videos().unwrap().is_empty());
    }

    #[test]
    fn re_adding_a_directory_updates_scan_depth() {
        let catalog = Catalog::open_in_memory().unwrap();
        let first = catalog.add_directory("/m", 1).unwrap();
        let second = catalog.add_directory("/m", 4).unwrap();
        assert_eq!(second.scan_depth, 4);
        assert_eq!(first.added_at, second.added_at);
        assert!(matches!(catalog.add_directory("  ", 1), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn scan_adds_new_files_and_prunes_vanished_ones() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        fs::write(dir.path().join("a.mp4"), b"a").unwrap();
        fs::write(dir.path().join("b.mkv"), b"bb").unwrap();

        let catalog = Catalog::open(&dir.path().join("db").join("catalog.sqlite")).unwrap();
        catalog.add_directory(&root, 2).unwrap();

        let first = catalog.scan_directory(&root).unwrap();
        assert_eq!(first, ScanSummary { total_videos: 2, new_videos: 2, removed_videos: 0 });

        fs::remove_file(dir.path().join("b.mkv")).unwrap();
        let second = catalog.scan_directory(&root).unwrap();
        assert_eq!(second, ScanSummary { total_videos: 1, new_videos: 0, removed_videos: 1 });
        assert_eq!(catalog.list_videos().unwrap().len(), 1);
    }

    #[test]
    fn scanning_an_unknown_directory_fails() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(matches!(catalog.scan_directory("/nowhere"), Err(Error::NotFound(_))));
    }

    #[test]
    fn scanning_an_unreadable_root_keeps_its_videos() {
        let dir = tempfile::tempdir().unwrap();
        let drive = dir.path().join("drive");
        fs::create_dir(&drive).unwrap();
        fs::write(drive.join("a.mp4"), b"a").unwrap();
        let root = drive.to_string_lossy().to_string();

        let catalog = Catalog::open_in_memory().unwrap();
        catalog.add_directory(&root, 2).unwrap();
        catalog.scan_directory(&root).unwrap();
        let id = catalog.list_videos().unwrap()[0].id;
        catalog.set_rating(id, 5).unwrap();
        catalog.set_video_tags(id, &["keep".into()]).unwrap();

        fs::rename(&drive, dir.path().join("unmounted")).unwrap();
        assert!(matches!(catalog.scan_directory(&root), Err(Error::Io(_))));

        let video = catalog.get_video(id).unwrap().unwrap();
        assert_eq!(video.rating, Some(5));
        assert_eq!(video.tags, vec!["keep".to_string()]);
    }
}
