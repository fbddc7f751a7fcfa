//! Backup copier (component N): a pre-sync timestamped snapshot of the
//! host library root, preserving file and directory mtimes.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;

pub struct BackupResult {
    pub dest: PathBuf,
    pub bytes_copied: u64,
}

/// Copy `library` into `<backup_root>/<epoch-millis>_<library-leaf>/`,
/// preserving mtimes and never following symlinks (§4.N). On any I/O error
/// the copy is abandoned immediately — the orchestrator treats a backup
/// failure as fatal.
pub fn backup(library: &Path, backup_root: &Path) -> std::io::Result<BackupResult> {
    let leaf = library
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("library");
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dest = backup_root.join(format!("{millis}_{leaf}"));

    let bytes_copied = copy_tree(library, &dest)?;
    Ok(BackupResult { dest, bytes_copied })
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<u64> {
    std::fs::create_dir_all(dst)?;
    let mut bytes = 0u64;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?; // does not follow a trailing symlink's target further
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            log::warn!("skipping symlink during backup: {}", path.display());
            continue;
        }

        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            bytes += copy_tree(&path, &dst_path)?;
            let mtime = FileTime::from_last_modification_time(&meta);
            filetime::set_file_mtime(&dst_path, mtime)?;
        } else {
            bytes += std::fs::copy(&path, &dst_path)?;
            let mtime = FileTime::from_last_modification_time(&meta);
            filetime::set_file_mtime(&dst_path, mtime)?;
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TestTempDir {
        path: PathBuf,
    }

    impl TestTempDir {
        fn new(label: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!(
                "cratesync-backup-test-{label}-{}",
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
    fn copies_nested_tree_and_preserves_mtime() {
        let dir = TestTempDir::new("basic");
        let library = dir.path.join("Library");
        fs::create_dir_all(library.join("Subcrates")).unwrap();
        fs::write(library.join("Subcrates/A.crate"), b"hello").unwrap();

        let backup_root = dir.path.join("Backups");
        fs::create_dir_all(&backup_root).unwrap();

        let src_mtime = fs::metadata(library.join("Subcrates/A.crate"))
            .unwrap()
            .modified()
            .unwrap();

        let result = backup(&library, &backup_root).unwrap();
        assert!(result.bytes_copied >= 5);

        let copied = result.dest.join("Subcrates/A.crate");
        assert!(copied.exists());
        assert_eq!(fs::read(&copied).unwrap(), b"hello");
        let dst_mtime = fs::metadata(&copied).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }

    #[test]
    fn dest_name_includes_library_leaf() {
        let dir = TestTempDir::new("leaf");
        let library = dir.path.join("MyLibrary");
        fs::create_dir_all(&library).unwrap();
        let backup_root = dir.path.join("Backups");
        fs::create_dir_all(&backup_root).unwrap();

        let result = backup(&library, &backup_root).unwrap();
        assert!(result
            .dest
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with("_MyLibrary"));
    }
}
