use mirrorsum_core::config::HashingConfig;
use mirrorsum_core::snapshot::FileSnapshot;
use mirrorsum_core::store::MemoryStore;
use mirrorsum_core::sync::{SyncOptions, Synchronizer};
use mirrorsum_core::verify::verify;

#[test]
fn detects_content_change_with_same_size() {
    let td = tempfile::tempdir().unwrap();
    let file = td.path().join("a.bin");
    let mut data = vec![5u8; 3 * 4096];
    std::fs::write(&file, &data).unwrap();

    let cfg = HashingConfig { chunk_size: 4096, ..HashingConfig::default() };
    let mut c = Synchronizer::new(MemoryStore::new(), cfg, SyncOptions::default()).unwrap();
    c.sync_path(&file, Some(td.path())).unwrap();

    let snap = FileSnapshot::capture(&file, Some(td.path())).unwrap();
    let ok = verify(c.store(), &snap).unwrap().unwrap();
    assert!(ok.is_ok());
    assert_eq!(ok.pieces_ok, 3);
    assert!(ok.metadata_ok);

    data[5000] = 6;
    std::fs::write(&file, &data).unwrap();
    let snap = FileSnapshot::capture(&file, Some(td.path())).unwrap();
    let bad = verify(c.store(), &snap).unwrap().unwrap();
    assert!(!bad.is_ok());
    assert!(!bad.whole_file_ok);
    assert_eq!((bad.pieces_ok, bad.pieces_bad), (2, 1));
}

#[test]
fn unknown_path_has_no_report() {
    let td = tempfile::tempdir().unwrap();
    let file = td.path().join("a.bin");
    std::fs::write(&file, b"x").unwrap();
    let snap = FileSnapshot::capture(&file, Some(td.path())).unwrap();
    assert_eq!(verify(&MemoryStore::new(), &snap).unwrap(), None);
}
