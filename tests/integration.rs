//! End-to-end scenarios from the pipeline's testable-properties list:
//! full crate/index/session round-trips plus a multi-directory
//! scan-to-sidebar walk through the real orchestrator.

use std::fs;
use std::path::{Path, PathBuf};

use cratesync::config::SyncConfig;
use cratesync::logger::NullLogger;
use cratesync::{crate_codec, index_codec, index_repair, io_prim, orchestrator, session_codec};

struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    fn new(label: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "cratesync-integration-test-{label}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        TestTempDir { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

#[test]
fn empty_crate_roundtrip_matches_defaults() {
    let c = crate_codec::Crate::new();
    let bytes = crate_codec::write(&c);
    let parsed = crate_codec::parse(&bytes).unwrap();

    assert_eq!(parsed.version, crate_codec::DEFAULT_VERSION);
    assert_eq!(parsed.sort_key, crate_codec::DEFAULT_SORT_KEY);
    assert_eq!(parsed.sort_revision, crate_codec::DEFAULT_SORT_REVISION);
    assert!(parsed.tracks().is_empty());
    assert!(c.equals(&parsed));
}

#[test]
fn index_repair_same_length_leaves_file_size_unchanged() {
    let mut w = io_prim::Writer::new();
    w.write_ascii(b"vrsn");
    w.write_bytes(&[0, 0]);
    w.write_u16(6);
    w.write_utf16be("2.1");

    let mut payload = io_prim::Writer::new();
    payload.write_ascii(b"pfil");
    let pfil = io_prim::encode_utf16be("Music/old.mp3");
    assert_eq!(pfil.len(), 28); // 14 chars * 2 bytes
    payload.write_u32(pfil.len() as u32);
    payload.write_bytes(&pfil);
    let payload_bytes = payload.into_bytes();
    w.write_ascii(b"otrk");
    w.write_u32(payload_bytes.len() as u32);
    w.write_bytes(&payload_bytes);
    let buf = w.into_bytes();

    let fix = index_repair::PathFix::new(
        io_prim::encode_utf16be("Music/old.mp3"),
        io_prim::encode_utf16be("Music/new.mp3"),
    );
    let (out, applied) = index_repair::apply_fixes(&buf, &[fix]);
    assert_eq!(applied, 1);
    assert_eq!(out.len(), buf.len());

    let idx = index_codec::parse(&out).unwrap();
    assert_eq!(idx.tracks()[0].path, "Music/new.mp3");
}

#[test]
fn index_repair_longer_replacement_grows_otrk_and_file_by_the_delta() {
    let mut w = io_prim::Writer::new();
    w.write_ascii(b"vrsn");
    w.write_bytes(&[0, 0]);
    w.write_u16(6);
    w.write_utf16be("2.1");

    let old_path = "Music/old.mp3";
    let new_path = "Music/much-longer-name.mp3";
    let old_bytes = io_prim::encode_utf16be(old_path);
    let new_bytes = io_prim::encode_utf16be(new_path);
    assert_eq!(old_bytes.len(), 26);
    assert_eq!(new_bytes.len(), 52);

    let mut payload = io_prim::Writer::new();
    payload.write_ascii(b"pfil");
    payload.write_u32(old_bytes.len() as u32);
    payload.write_bytes(&old_bytes);
    let payload_bytes = payload.into_bytes();
    let otrk_len_before = payload_bytes.len();
    w.write_ascii(b"otrk");
    w.write_u32(otrk_len_before as u32);
    w.write_bytes(&payload_bytes);
    let buf = w.into_bytes();
    let file_len_before = buf.len();

    let fix = index_repair::PathFix::new(old_bytes, new_bytes);
    let (out, applied) = index_repair::apply_fixes(&buf, &[fix]);
    assert_eq!(applied, 1);
    assert_eq!(out.len(), file_len_before + 26);

    let idx = index_codec::parse(&out).unwrap();
    assert_eq!(idx.tracks()[0].path, new_path);
    // the rewritten otrk block length field itself grew by the same delta
    let otrk_tag_pos = out.windows(4).position(|w| w == b"otrk").unwrap();
    let new_block_len = u32::from_be_bytes(out[otrk_tag_pos + 4..otrk_tag_pos + 8].try_into().unwrap());
    assert_eq!(new_block_len as usize, otrk_len_before + 26);
}

#[test]
fn session_path_fix_preserves_trailing_nul_padding_and_entry_lengths() {
    let mut path_value = io_prim::encode_utf16be("/Volumes/V/X.mp3");
    path_value.extend_from_slice(&[0, 0, 0, 0]); // two trailing NUL units
    assert_eq!(path_value.len(), 36);

    let mut adat = io_prim::Writer::new();
    adat.write_u8(session_codec::PATH_FIELD_ID);
    adat.write_u32(path_value.len() as u32);
    adat.write_bytes(&path_value);
    let adat_bytes = adat.into_bytes();

    let mut oent = io_prim::Writer::new();
    oent.write_ascii(b"adat");
    oent.write_u32(adat_bytes.len() as u32);
    oent.write_bytes(&adat_bytes);
    let oent_bytes = oent.into_bytes();

    let mut w = io_prim::Writer::new();
    w.write_ascii(b"vrsn");
    w.write_bytes(&[0, 0]);
    w.write_u16(6);
    w.write_utf16be("2.1");
    w.write_ascii(b"oent");
    w.write_u32(oent_bytes.len() as u32);
    w.write_bytes(&oent_bytes);
    let buf = w.into_bytes();

    let (out, applied) =
        session_codec::apply_path_fix(&buf, "/Volumes/V/X.mp3", "/Volumes/V/Y.mp3").unwrap();
    assert_eq!(applied, 1);
    assert_eq!(out.len(), buf.len());

    let entries = session_codec::parse_session(&out).unwrap();
    assert_eq!(entries[0].path.as_deref(), Some("/Volumes/V/Y.mp3\u{0}\u{0}"));
}

/// Multi-directory scan-to-sidebar walk through the real orchestrator: a
/// nested music tree syncs into a hierarchy of crates, and a rerun with no
/// filesystem changes writes nothing (smart-write no-op, §8 P5), while the
/// sidebar manifest enumerates every crate file in sorted order.
#[test]
fn full_sync_builds_hierarchy_and_rerun_is_a_no_op() {
    let dir = TestTempDir::new("full-sync");
    let music_root = dir.path().join("Music");
    let library = dir.path().join("Library");

    fs::create_dir_all(music_root.join("Genre/House")).unwrap();
    fs::create_dir_all(music_root.join("Genre/Techno")).unwrap();
    fs::write(music_root.join("root-track.mp3"), b"x").unwrap();
    fs::write(music_root.join("Genre/House/a.mp3"), b"x").unwrap();
    fs::write(music_root.join("Genre/House/b.flac"), b"x").unwrap();
    fs::write(music_root.join("Genre/Techno/c.wav"), b"x").unwrap();

    let mut config = SyncConfig::minimal(music_root, library.clone());
    config.parent_crate_name = vec!["Current".to_string()];
    config.sort = true;

    let first = orchestrator::run(&config, &NullLogger).unwrap();
    assert_eq!(first.tracks_found, 4);
    assert_eq!(first.crates_updated, 4); // Current, Current%%Genre, %%House, %%Techno
    assert_eq!(first.crates_skipped, 0);

    let subcrates = library.join("Subcrates");
    assert!(subcrates.join("Current.crate").exists());
    assert!(subcrates.join("Current%%Genre.crate").exists());
    assert!(subcrates.join("Current%%Genre%%House.crate").exists());
    assert!(subcrates.join("Current%%Genre%%Techno.crate").exists());

    let manifest = fs::read(library.join("neworder.pref")).unwrap();
    let text = io_prim::decode_utf16be(&manifest).unwrap();
    assert!(text.starts_with("[begin record]\n"));
    assert!(text.contains("[crate]Current\n"));
    assert!(text.contains("[crate]Current%%Genre%%House\n"));
    assert!(text.contains("[crate]Current%%Genre%%Techno\n"));

    let mtimes_before: Vec<_> = [
        "Current.crate",
        "Current%%Genre.crate",
        "Current%%Genre%%House.crate",
        "Current%%Genre%%Techno.crate",
    ]
    .iter()
    .map(|n| fs::metadata(subcrates.join(n)).unwrap().modified().unwrap())
    .collect();

    std::thread::sleep(std::time::Duration::from_millis(10));
    let second = orchestrator::run(&config, &NullLogger).unwrap();
    assert_eq!(second.crates_updated, 0);
    assert_eq!(second.crates_skipped, 4);

    let mtimes_after: Vec<_> = [
        "Current.crate",
        "Current%%Genre.crate",
        "Current%%Genre%%House.crate",
        "Current%%Genre%%Techno.crate",
    ]
    .iter()
    .map(|n| fs::metadata(subcrates.join(n)).unwrap().modified().unwrap())
    .collect();
    assert_eq!(mtimes_before, mtimes_after);
}

/// Dedup mover keep-newest (§8 P7 / S8): after the run, the newest file in a
/// fingerprint group stays at its original path and every older copy is
/// quarantined under the timestamped folder.
#[test]
fn dupe_mover_keep_newest_retains_only_the_newest_copy() {
    let dir = TestTempDir::new("dupe-e2e");
    let music_root = dir.path().join("Music");
    let library = dir.path().join("Library");
    fs::create_dir_all(music_root.join("A")).unwrap();
    fs::create_dir_all(music_root.join("B")).unwrap();
    fs::create_dir_all(music_root.join("C")).unwrap();

    let oldest = music_root.join("A/track.mp3");
    let middle = music_root.join("B/track.mp3");
    let newest = music_root.join("C/track.mp3");
    fs::write(&oldest, b"x").unwrap();
    fs::write(&middle, b"x").unwrap();
    fs::write(&newest, b"x").unwrap();

    let epoch = std::time::SystemTime::UNIX_EPOCH;
    filetime::set_file_mtime(
        &oldest,
        filetime::FileTime::from_system_time(epoch + std::time::Duration::from_secs(1_000)),
    )
    .unwrap();
    filetime::set_file_mtime(
        &middle,
        filetime::FileTime::from_system_time(epoch + std::time::Duration::from_secs(2_000)),
    )
    .unwrap();
    filetime::set_file_mtime(
        &newest,
        filetime::FileTime::from_system_time(epoch + std::time::Duration::from_secs(3_000)),
    )
    .unwrap();

    let mut config = SyncConfig::minimal(music_root.clone(), library);
    config.dupe_scan = true;
    config.dupe_detection = Some(cratesync::dupe_mover::FingerprintMode::NameOnly);
    config.dupe_move = cratesync::config::DupeMovePolicy::KeepNewest;
    config.quarantine_root = Some(dir.path().join("Quarantine"));

    let snapshot = orchestrator::run(&config, &NullLogger).unwrap();
    assert_eq!(snapshot.duplicates_moved, 2);
    assert_eq!(snapshot.tracks_found, 1);

    assert!(newest.exists());
    assert!(!oldest.exists());
    assert!(!middle.exists());
}
