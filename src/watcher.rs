use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use log::{debug, info};

use crate::now_ms;
use crate::stats::{bump, SessionStats};

pub const SCREENSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tga", "bmp"];

/// Screenshot folder candidates beneath the configured game folder, checked
/// in order. Classic-era installs nest them one level deeper than retail.
const SCREENSHOT_SUBDIRS: &[&str] = &[
    "_classic_/Screenshots",
    "_classic_era_/Screenshots",
    "_classic_ptr_/Screenshots",
    "_retail_/Screenshots",
    "Screenshots",
];

/// After accepting an event, skip polling for this long.
const COOLDOWN_MS: i64 = 1_000;
/// Same path + same size seen again within this window is a duplicate OS write.
const DUPLICATE_WINDOW_MS: i64 = 3_000;

/// A freshly written screenshot. Lives only for one tick's processing.
#[derive(Debug, Clone)]
pub struct ScreenshotEvent {
    pub path: PathBuf,
    pub modified_at_ms: i64,
    pub size_bytes: u64,
}

/// Polls the screenshots directory once per tick and yields at most one
/// unseen screenshot. Filesystem errors never escape a tick; they read as
/// "nothing new".
pub struct ScreenshotWatcher {
    base_folder: PathBuf,
    /// Cached after the first successful resolution.
    resolved: Option<PathBuf>,
    process_start_ms: i64,
    high_watermark_ms: i64,
    cooldown_until_ms: i64,
    /// Per-path (size, last seen) for the duplicate-write filter.
    recent: HashMap<PathBuf, (u64, i64)>,
    stats: Arc<SessionStats>,
}

impl ScreenshotWatcher {
    pub fn new(base_folder: impl Into<PathBuf>, stats: Arc<SessionStats>) -> Self {
        Self {
            base_folder: base_folder.into(),
            resolved: None,
            process_start_ms: now_ms(),
            high_watermark_ms: 0,
            cooldown_until_ms: 0,
            recent: HashMap::new(),
            stats,
        }
    }

    /// Overrides the staleness boundary; screenshots older than this are
    /// never classified.
    pub fn with_process_start(mut self, process_start_ms: i64) -> Self {
        self.process_start_ms = process_start_ms;
        self
    }

    /// Advance the watermark past everything already on disk so that only
    /// screenshots written after this call can trigger.
    pub fn prime(&mut self) {
        if let Some((path, mtime_ms, _)) = self.latest_screenshot() {
            debug!("priming watermark at {} ({mtime_ms})", path.display());
            self.high_watermark_ms = mtime_ms;
        }
    }

    /// Called once per tick. Returns the newest unseen screenshot, if any.
    pub fn poll(&mut self) -> Option<ScreenshotEvent> {
        let now = now_ms();
        if now < self.cooldown_until_ms {
            return None;
        }

        let (path, mtime_ms, size_bytes) = self.latest_screenshot()?;

        if mtime_ms <= self.high_watermark_ms {
            return None;
        }
        if mtime_ms < self.process_start_ms {
            bump(&self.stats.ignored_old);
            debug!("ignored pre-start screenshot {}", path.display());
            return None;
        }

        // Duplicate OS write: same path re-surfacing with the same size
        // moments later.
        if let Some(&(prev_size, seen_at)) = self.recent.get(&path) {
            if prev_size == size_bytes && now - seen_at < DUPLICATE_WINDOW_MS {
                return None;
            }
        }
        // Entries past the window can never match again; drop them so the
        // map stays bounded over a long session.
        self.recent
            .retain(|_, &mut (_, seen_at)| now - seen_at < DUPLICATE_WINDOW_MS);
        self.recent.insert(path.clone(), (size_bytes, now));

        self.high_watermark_ms = mtime_ms;
        self.cooldown_until_ms = now + COOLDOWN_MS;

        Some(ScreenshotEvent {
            path,
            modified_at_ms: mtime_ms,
            size_bytes,
        })
    }

    /// The screenshot with the newest mtime, or `None` on any fs trouble.
    fn latest_screenshot(&mut self) -> Option<(PathBuf, i64, u64)> {
        let dir = self.resolve_dir()?;
        let entries = fs::read_dir(&dir).ok()?;

        let mut newest: Option<(PathBuf, i64, u64)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_screenshot(&path) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Some(mtime_ms) = mtime_ms(&metadata) else {
                continue;
            };
            if newest.as_ref().map_or(true, |(_, best, _)| mtime_ms > *best) {
                newest = Some((path, mtime_ms, metadata.len()));
            }
        }
        newest
    }

    fn resolve_dir(&mut self) -> Option<PathBuf> {
        if let Some(dir) = &self.resolved {
            return Some(dir.clone());
        }
        if self.base_folder.as_os_str().is_empty() || !self.base_folder.exists() {
            return None;
        }

        for candidate in SCREENSHOT_SUBDIRS {
            let dir = self.base_folder.join(candidate);
            if dir.is_dir() {
                info!("screenshots folder: {}", dir.display());
                self.resolved = Some(dir.clone());
                return Some(dir);
            }
        }

        debug!(
            "no screenshots folder found under {}",
            self.base_folder.display()
        );
        None
    }
}

fn is_screenshot(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SCREENSHOT_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

fn mtime_ms(metadata: &fs::Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn duplicate_filter_evicts_expired_entries() {
        let dir = TempDir::new().unwrap();
        let shots = dir.path().join("Screenshots");
        fs::create_dir_all(&shots).unwrap();

        let stats = Arc::new(SessionStats::default());
        let mut watcher = ScreenshotWatcher::new(dir.path(), stats).with_process_start(0);

        let expired = shots.join("WoWScrnShot_080000.png");
        watcher
            .recent
            .insert(expired.clone(), (128, now_ms() - DUPLICATE_WINDOW_MS - 1));

        fs::write(shots.join("WoWScrnShot_083000.png"), b"fresh shot").unwrap();
        let event = watcher.poll().expect("fresh screenshot accepted");
        assert!(event.path.ends_with("WoWScrnShot_083000.png"));

        assert!(!watcher.recent.contains_key(&expired));
        assert_eq!(watcher.recent.len(), 1);
    }
}
