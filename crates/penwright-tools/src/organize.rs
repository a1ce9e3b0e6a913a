//! Markdown organizer: renames finished reports after their title and moves
//! them into a flat destination folder.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use penwright_core::config::WatcherConfig;
use penwright_core::error::{PenwrightError, Result};

const MARKDOWN_EXT: &str = "md";

/// URL-friendly form of `text`: lowercase, word characters and hyphens only.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_separator = false;
    for c in text.to_lowercase().chars() {
        if c.is_whitespace() || c == '_' {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else if c.is_alphanumeric() || c == '-' {
            out.push(c);
            in_separator = false;
        }
    }
    out.trim_matches('-').to_string()
}

/// Slug of the first level-one heading in `content`.
pub fn heading_slug(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix('#')?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let slug = slugify(line.trim_matches(|c| c == '#' || c == ' ').trim());
        (!slug.is_empty()).then_some(slug)
    })
}

/// Read a file and return its heading slug.
pub fn extract_heading(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => heading_slug(&content),
        Err(e) => {
            error!(file = %path.display(), error = %e, "Failed to read markdown file");
            None
        }
    }
}

/// Wait until the file size is identical across two consecutive polls.
pub async fn wait_until_ready(path: &Path, timeout: Duration, poll: Duration) -> bool {
    let start = Instant::now();
    let mut last_size = None;
    while start.elapsed() < timeout {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            let size = meta.len();
            if last_size == Some(size) {
                return true;
            }
            last_size = Some(size);
        }
        tokio::time::sleep(poll).await;
    }
    false
}

/// First free `slug.md`, `slug-1.md`, `slug-2.md`, ... in `dest_dir`.
pub fn unique_destination(dest_dir: &Path, slug: &str) -> PathBuf {
    let mut candidate = dest_dir.join(format!("{slug}.{MARKDOWN_EXT}"));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dest_dir.join(format!("{slug}-{counter}.{MARKDOWN_EXT}"));
        counter += 1;
    }
    candidate
}

fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(MARKDOWN_EXT)
}

/// Markdown files under `root`, in file-name order.
fn markdown_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_markdown(e.path()))
        .map(|e| e.into_path())
        .collect()
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        // rename fails across filesystems
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

/// Organizes files from a watched root into a destination folder.
pub struct Organizer {
    config: WatcherConfig,
    watch_root: PathBuf,
    dest_dir: PathBuf,
}

impl Organizer {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            watch_root: PathBuf::from(&config.watch_dir),
            dest_dir: PathBuf::from(&config.dest_dir),
            config,
        }
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.watch_root)?;
        std::fs::create_dir_all(&self.dest_dir)?;
        Ok(())
    }

    /// Move one Markdown file under its heading slug.
    /// Returns the destination, or `None` when the file was skipped.
    pub async fn organize_file(&self, path: &Path) -> Result<Option<PathBuf>> {
        if path.is_dir() || !is_markdown(path) {
            return Ok(None);
        }
        if !path.exists() {
            debug!(file = %path.display(), "File already gone");
            return Ok(None);
        }
        info!(file = %path.display(), "Detected new file");

        let timeout = Duration::from_secs(self.config.stabilize_timeout_secs);
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        if !wait_until_ready(path, timeout, poll).await {
            warn!(file = %path.display(), "File never stabilized");
            return Ok(None);
        }

        let Some(slug) = extract_heading(path) else {
            warn!(file = %path.display(), "No heading found, skipping");
            return Ok(None);
        };

        std::fs::create_dir_all(&self.dest_dir)?;
        let dest = unique_destination(&self.dest_dir, &slug);
        move_file(path, &dest)?;
        info!(from = %path.display(), to = %dest.display(), "Moved");

        if self.config.remove_empty_dirs {
            self.remove_if_empty(path.parent());
        }
        Ok(Some(dest))
    }

    fn remove_if_empty(&self, dir: Option<&Path>) {
        let Some(dir) = dir else { return };
        if dir == self.watch_root || !dir.starts_with(&self.watch_root) {
            return;
        }
        let empty = std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            match std::fs::remove_dir(dir) {
                Ok(()) => info!(dir = %dir.display(), "Removed empty folder"),
                Err(e) => debug!(dir = %dir.display(), error = %e, "Could not remove folder"),
            }
        }
    }

    /// One pass over Markdown files already under the watched root.
    pub async fn organize_existing(&self) -> Result<Vec<PathBuf>> {
        self.ensure_dirs()?;
        let mut moved = Vec::new();
        for file in markdown_files(&self.watch_root) {
            match self.organize_file(&file).await {
                Ok(Some(dest)) => moved.push(dest),
                Ok(None) => {}
                Err(e) => error!(file = %file.display(), error = %e, "Error processing file"),
            }
        }
        Ok(moved)
    }

    /// Watch the root recursively and organize new Markdown files until `shutdown` resolves.
    pub async fn watch<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.ensure_dirs()?;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| PenwrightError::Watch(e.to_string()))?;
        watcher
            .watch(&self.watch_root, RecursiveMode::Recursive)
            .map_err(|e| PenwrightError::Watch(e.to_string()))?;

        info!(folder = %self.watch_root.display(), "Watching folder");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Ok(event) if is_arrival(&event.kind) => {
                            for path in event.paths {
                                self.organize_arrival(&path).await;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Watcher error"),
                    }
                }
            }
        }

        info!("Stopped watching");
        Ok(())
    }

    /// Files written into a folder before its watch is registered raise no
    /// events of their own, so a new folder is scanned as a whole.
    async fn organize_arrival(&self, path: &Path) {
        let files = if path.is_dir() {
            markdown_files(path)
        } else {
            vec![path.to_path_buf()]
        };
        for file in files {
            if let Err(e) = self.organize_file(&file).await {
                error!(file = %file.display(), error = %e, "Error processing file");
            }
        }
    }
}

/// Files appear either by creation or by being renamed into the tree.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(root: &Path) -> WatcherConfig {
        WatcherConfig {
            watch_dir: root.join("reports").display().to_string(),
            dest_dir: root.join("reports_md").display().to_string(),
            stabilize_timeout_secs: 2,
            poll_interval_ms: 10,
            remove_empty_dirs: true,
        }
    }

    #[test]
    fn slugify_cases() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust_and  Go -- 2026 "), "rust-and-go----2026");
        assert_eq!(slugify("Crème brûlée"), "crème-brûlée");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn heading_is_first_h1() {
        let content = "---\ntitle: x\n---\n## Not this\n#NoSpace\n  # The Real Title #\n# Later";
        assert_eq!(heading_slug(content).as_deref(), Some("the-real-title"));
        assert_eq!(heading_slug("no heading here"), None);
    }

    #[test]
    fn duplicate_names_get_counter() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_destination(dir.path(), "a"), dir.path().join("a.md"));
        std::fs::write(dir.path().join("a.md"), "").unwrap();
        assert_eq!(unique_destination(dir.path(), "a"), dir.path().join("a-1.md"));
        std::fs::write(dir.path().join("a-1.md"), "").unwrap();
        assert_eq!(unique_destination(dir.path(), "a"), dir.path().join("a-2.md"));
    }

    #[tokio::test]
    async fn ready_when_size_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.md");
        std::fs::write(&path, "done").unwrap();
        assert!(wait_until_ready(&path, Duration::from_secs(1), Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn missing_file_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.md");
        assert!(!wait_until_ready(&path, Duration::from_millis(50), Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn organizes_existing_reports_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = Organizer::new(fast_config(dir.path()));
        let run_a = organizer.watch_root().join("run_a");
        let run_b = organizer.watch_root().join("run_b");
        std::fs::create_dir_all(&run_a).unwrap();
        std::fs::create_dir_all(&run_b).unwrap();
        std::fs::write(run_a.join("x.md"), "# Same Title\nbody").unwrap();
        std::fs::write(run_b.join("y.md"), "# Same Title\nbody").unwrap();
        std::fs::write(run_b.join("report.json"), "{}").unwrap();
        std::fs::write(organizer.watch_root().join("untitled.md"), "no heading").unwrap();

        let moved = organizer.organize_existing().await.unwrap();
        assert_eq!(moved.len(), 2);
        assert!(organizer.dest_dir().join("same-title.md").exists());
        assert!(organizer.dest_dir().join("same-title-1.md").exists());
        // run_a became empty, run_b still holds report.json
        assert!(!run_a.exists());
        assert!(run_b.exists());
        // files without a heading stay where they are
        assert!(organizer.watch_root().join("untitled.md").exists());
    }

    #[tokio::test]
    async fn non_markdown_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = Organizer::new(fast_config(dir.path()));
        std::fs::create_dir_all(organizer.watch_root()).unwrap();
        let path = organizer.watch_root().join("a.pdf");
        std::fs::write(&path, "%PDF").unwrap();
        assert!(organizer.organize_file(&path).await.unwrap().is_none());
    }

    async fn wait_for(path: &Path) {
        for _ in 0..100 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn watch_moves_reports_written_into_new_folders() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = Organizer::new(fast_config(dir.path()));
        let root = organizer.watch_root().to_path_buf();
        let run_dir = root.join("run_1");
        let nested = organizer.dest_dir().join("watched-title.md");
        let loose = organizer.dest_dir().join("loose-note.md");

        // Folder and file appear together, the way the publisher writes them.
        let publish_then_stop = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            std::fs::create_dir_all(&run_dir).unwrap();
            std::fs::write(run_dir.join("abc.md"), "# Watched Title\nbody").unwrap();
            std::fs::write(root.join("loose.md"), "# Loose Note\nbody").unwrap();
            wait_for(&nested).await;
            wait_for(&loose).await;
        };
        organizer.watch(publish_then_stop).await.unwrap();

        assert!(nested.exists());
        assert!(loose.exists());
        assert!(!run_dir.exists());
        assert!(!root.join("loose.md").exists());
    }

    #[tokio::test]
    async fn watch_returns_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = Organizer::new(fast_config(dir.path()));
        organizer
            .watch(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(organizer.watch_root().is_dir());
        assert!(organizer.dest_dir().is_dir());
    }
}
