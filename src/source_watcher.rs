//! Shader source change detection
//!
//! Everything downstream sees a single monotonic counter. Whether it moves
//! because a polling thread saw a new modification time, a filesystem event
//! arrived, or someone called `bump()` by hand is invisible to the cache.

use crate::error::{SurfaceError, SurfaceResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// Shared monotonic source version
#[derive(Debug, Clone, Default)]
pub struct SourceVersion(Arc<AtomicU64>);

impl SourceVersion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance the version; returns the new value
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Anything that exposes a monotonic version number
pub trait VersionSource: Send + Sync {
    fn version(&self) -> u64;
}

impl VersionSource for SourceVersion {
    fn version(&self) -> u64 {
        self.current()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileSnapshot {
    modified: Option<SystemTime>,
    len: u64,
}

fn snapshot(path: &Path) -> Option<FileSnapshot> {
    std::fs::metadata(path).ok().map(|metadata| FileSnapshot {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

/// Level-triggered watcher comparing file metadata snapshots
///
/// A file appearing or disappearing counts as a change.
#[derive(Debug)]
pub struct PollingSourceWatcher {
    paths: Vec<PathBuf>,
    snapshots: Vec<Option<FileSnapshot>>,
    version: SourceVersion,
}

impl PollingSourceWatcher {
    pub fn new(paths: Vec<PathBuf>, version: SourceVersion) -> Self {
        let snapshots = paths.iter().map(|p| snapshot(p)).collect();
        Self {
            paths,
            snapshots,
            version,
        }
    }

    pub fn version(&self) -> &SourceVersion {
        &self.version
    }

    /// Check every file once; bumps the version at most once per call
    pub fn poll(&mut self) -> bool {
        let current: Vec<Option<FileSnapshot>> = self.paths.iter().map(|p| snapshot(p)).collect();
        if current == self.snapshots {
            return false;
        }

        self.snapshots = current;
        let version = self.version.bump();
        log::info!(
            "[source_watcher::poll] Shader sources changed, source version now {}",
            version
        );
        true
    }

    /// Poll on a monitoring thread until the returned handle is dropped
    pub fn spawn(mut self, interval: Duration) -> SurfaceResult<WatcherThread> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("shader-source-watcher".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    self.poll();
                    std::thread::park_timeout(interval);
                }
            })
            .map_err(|e| SurfaceError::AssetWatchError {
                path: "<watcher thread>".to_string(),
                error: e.to_string(),
            })?;

        Ok(WatcherThread {
            stop,
            handle: Some(handle),
        })
    }
}

/// Running polling thread; dropping it stops and joins the thread
#[derive(Debug)]
pub struct WatcherThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for WatcherThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("[source_watcher::drop] Watcher thread panicked");
            }
        }
    }
}

/// Event-driven watcher bumping on `.wgsl` changes in a directory
///
/// Watching stops when this is dropped.
#[cfg(feature = "native")]
pub struct NotifySourceWatcher {
    _watcher: notify::RecommendedWatcher,
}

#[cfg(feature = "native")]
impl NotifySourceWatcher {
    pub fn watch_directory(directory: &Path, version: SourceVersion) -> SurfaceResult<Self> {
        use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

        let watch_error = |e: notify::Error| SurfaceError::AssetWatchError {
            path: directory.display().to_string(),
            error: e.to_string(),
        };

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("[source_watcher::notify] Watch error: {}", e);
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let touches_template = event
                    .paths
                    .iter()
                    .any(|path| path.extension().and_then(|e| e.to_str()) == Some("wgsl"));
                if touches_template {
                    let current = version.bump();
                    log::info!(
                        "[source_watcher::notify] Shader sources changed, source version now {}",
                        current
                    );
                }
            },
            Config::default(),
        )
        .map_err(watch_error)?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        log::info!(
            "[source_watcher::watch_directory] Watching {}",
            directory.display()
        );
        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_manual_bump() {
        let version = SourceVersion::new();
        let shared = version.clone();
        assert_eq!(version.current(), 0);
        assert_eq!(shared.bump(), 1);
        assert_eq!(version.version(), 1);
    }

    #[test]
    fn test_poll_bumps_once_per_change() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("surface_vertex.wgsl");
        std::fs::write(&path, "// a").expect("write");

        let mut watcher = PollingSourceWatcher::new(vec![path.clone()], SourceVersion::new());
        assert!(!watcher.poll());
        assert_eq!(watcher.version().current(), 0);

        std::fs::write(&path, "// a longer edit").expect("write");
        assert!(watcher.poll());
        assert!(!watcher.poll());
        assert_eq!(watcher.version().current(), 1);
    }

    #[test]
    fn test_created_file_counts_as_change() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("surface_shadow.wgsl");

        let mut watcher = PollingSourceWatcher::new(vec![path.clone()], SourceVersion::new());
        std::fs::write(&path, "fn shadow_factor() {}").expect("write");
        assert!(watcher.poll());

        std::fs::remove_file(&path).expect("remove");
        assert!(watcher.poll());
        assert_eq!(watcher.version().current(), 2);
    }

    #[test]
    fn test_spawned_watcher_observes_change() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("contour_elevation.wgsl");
        std::fs::write(&path, "x").expect("write");

        let version = SourceVersion::new();
        let watcher = PollingSourceWatcher::new(vec![path.clone()], version.clone());
        let thread = watcher.spawn(Duration::from_millis(10)).expect("spawn");

        std::fs::write(&path, "xyz").expect("write");
        let deadline = Instant::now() + Duration::from_secs(5);
        while version.current() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        drop(thread);

        assert_eq!(version.current(), 1);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_notify_watcher_bumps_on_template_write() {
        let dir = tempfile::tempdir().expect("temp dir");
        let version = SourceVersion::new();
        let watcher =
            NotifySourceWatcher::watch_directory(dir.path(), version.clone()).expect("watch");

        std::fs::write(dir.path().join("surface_illumination.wgsl"), "fn f() {}").expect("write");
        let deadline = Instant::now() + Duration::from_secs(5);
        while version.current() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        drop(watcher);

        assert!(version.current() >= 1);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_notify_watcher_rejects_missing_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("absent");
        assert!(matches!(
            NotifySourceWatcher::watch_directory(&missing, SourceVersion::new()),
            Err(SurfaceError::AssetWatchError { .. })
        ));
    }
}
