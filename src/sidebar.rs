//! Sidebar-order emitter (component M): write the sorted-crate sidebar
//! manifest the host reads to order its crate tree view.

use std::path::Path;

use crate::io_prim::encode_utf16be;

const MANIFEST_NAME: &str = "neworder.pref";

/// Enumerate `<library>/Subcrates/*.crate`, sort the names lexicographically
/// (extension stripped), and (re)write `<library>/neworder.pref`.
pub fn write_sidebar_order(library: &Path) -> std::io::Result<()> {
    let subcrates = library.join("Subcrates");
    let mut names: Vec<String> = std::fs::read_dir(&subcrates)?
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            if path.extension().and_then(|e| e.to_str()) == Some("crate") {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            } else {
                None
            }
        })
        .collect();
    names.sort();

    let manifest_path = library.join(MANIFEST_NAME);
    if manifest_path.exists() {
        std::fs::remove_file(&manifest_path)?;
    }

    let mut text = String::from("[begin record]\n");
    for name in &names {
        text.push_str("[crate]");
        text.push_str(name);
        text.push('\n');
    }
    text.push_str("[end record]\n");

    std::fs::write(&manifest_path, encode_utf16be(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_prim::decode_utf16be;
    use std::fs;
    use std::path::PathBuf;

    struct TestTempDir {
        path: PathBuf,
    }

    impl TestTempDir {
        fn new(label: &str) -> Self {
            let mut path = std::env::temp_dir();
            path.push(format!(
                "cratesync-sidebar-test-{label}-{}",
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
    fn writes_sorted_crate_names_with_framing() {
        let dir = TestTempDir::new("basic");
        let subcrates = dir.path.join("Subcrates");
        fs::create_dir_all(&subcrates).unwrap();
        fs::write(subcrates.join("Zeta.crate"), b"").unwrap();
        fs::write(subcrates.join("Alpha%%Beta.crate"), b"").unwrap();
        fs::write(subcrates.join("not-a-crate.txt"), b"").unwrap();

        write_sidebar_order(&dir.path).unwrap();

        let bytes = fs::read(dir.path.join("neworder.pref")).unwrap();
        let text = decode_utf16be(&bytes).unwrap();
        assert_eq!(
            text,
            "[begin record]\n[crate]Alpha%%Beta\n[crate]Zeta\n[end record]\n"
        );
    }

    #[test]
    fn overwrites_an_existing_manifest() {
        let dir = TestTempDir::new("overwrite");
        let subcrates = dir.path.join("Subcrates");
        fs::create_dir_all(&subcrates).unwrap();
        fs::write(subcrates.join("A.crate"), b"").unwrap();
        fs::write(dir.path.join("neworder.pref"), b"stale").unwrap();

        write_sidebar_order(&dir.path).unwrap();
        let bytes = fs::read(dir.path.join("neworder.pref")).unwrap();
        assert_ne!(bytes, b"stale");
    }
}
