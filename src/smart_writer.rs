//! Smart writer (component I): write a crate to disk only when its
//! semantic content actually changed, so the host never sees a spurious
//! modified-time update.

use std::path::Path;

use crate::crate_codec::{self, Crate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Skipped,
    Updated,
}

/// Parse, compare, and conditionally write `prospective` to `target_path`
/// (§4.I). A target that fails to parse is treated as absent.
pub fn smart_write(target_path: &Path, prospective: &Crate) -> std::io::Result<WriteOutcome> {
    let existing = std::fs::read(target_path)
        .ok()
        .and_then(|bytes| crate_codec::parse(&bytes).ok());

    if let Some(existing) = existing {
        if existing.equals(prospective) {
            return Ok(WriteOutcome::Skipped);
        }
    }

    let bytes = crate_codec::write(prospective);
    if let Some(parent) = target_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target_path, bytes)?;
    Ok(WriteOutcome::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    struct TestTempDir {
        path: PathBuf,
    }

    impl TestTempDir {
        fn new(label: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!(
                "cratesync-smartwriter-test-{label}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&path);
            fs::create_dir_all(&path).unwrap();
            TestTempDir { path }
        }
    }

    impl Drop for TestTempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn writes_when_target_missing() {
        let dir = TestTempDir::new("missing");
        let target = dir.path.join("Foo.crate");
        let mut c = Crate::new();
        c.add_track("Music/A.mp3");

        let outcome = smart_write(&target, &c).unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);
        assert!(target.exists());
    }

    #[test]
    fn skips_and_preserves_mtime_when_semantically_equal() {
        let dir = TestTempDir::new("noop");
        let target = dir.path.join("Foo.crate");
        let mut c = Crate::new();
        c.add_track("/Volumes/V/Music/A.mp3");
        smart_write(&target, &c).unwrap();

        let mtime_before = fs::metadata(&target).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));

        let mut c2 = Crate::new();
        c2.add_track(r"Music\A.mp3"); // same canonical path, different form
        let outcome = smart_write(&target, &c2).unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);

        let mtime_after = fs::metadata(&target).unwrap().modified().unwrap();
        assert_eq!(mtime_before, mtime_after);
    }

    #[test]
    fn writes_when_tracks_differ() {
        let dir = TestTempDir::new("changed");
        let target = dir.path.join("Foo.crate");
        let mut c = Crate::new();
        c.add_track("Music/A.mp3");
        smart_write(&target, &c).unwrap();

        let mut c2 = Crate::new();
        c2.add_track("Music/A.mp3");
        c2.add_track("Music/B.mp3");
        let outcome = smart_write(&target, &c2).unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);
    }
}
