use ferry_core::{
    ConfigError, CopyStatus, EngineConfig, FileSystem, FsError, LocalFileSystem, keep_both_path,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_copy_file_reports_bytes() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("data.bin");
    fs::write(&src, vec![7u8; 1024]).unwrap();
    let dst = temp.path().join("copy.bin");

    let status = LocalFileSystem::new().copy_item(&src, &dst).unwrap();

    assert_eq!(status, CopyStatus::Copied { bytes: 1024 });
    assert_eq!(fs::read(&dst).unwrap().len(), 1024);
    assert!(src.exists());
}

#[test]
fn test_copy_directory_tree() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("tree");
    fs::create_dir_all(src.join("nested/deeper")).unwrap();
    fs::write(src.join("a.txt"), "aaa").unwrap();
    fs::write(src.join("nested/b.txt"), "bb").unwrap();
    fs::write(src.join("nested/deeper/c.txt"), "c").unwrap();
    let dst = temp.path().join("out");

    let status = LocalFileSystem::new().copy_item(&src, &dst).unwrap();

    assert_eq!(status, CopyStatus::Copied { bytes: 6 });
    assert_eq!(fs::read_to_string(dst.join("nested/deeper/c.txt")).unwrap(), "c");
}

#[test]
fn test_copy_missing_source() {
    let temp = TempDir::new().unwrap();
    let err = LocalFileSystem::new()
        .copy_item(&temp.path().join("nope"), &temp.path().join("out"))
        .unwrap_err();
    assert!(matches!(err, FsError::NotFound { .. }));
}

#[test]
fn test_delete_file_and_directory() {
    let temp = TempDir::new().unwrap();
    let fs_impl = LocalFileSystem::new();

    let file = temp.path().join("f.txt");
    fs::write(&file, "x").unwrap();
    fs_impl.delete_item(&file).unwrap();
    assert!(!fs_impl.exists(&file));

    let dir = temp.path().join("d");
    fs::create_dir_all(dir.join("inner")).unwrap();
    fs::write(dir.join("inner/f.txt"), "x").unwrap();
    fs_impl.delete_item(&dir).unwrap();
    assert!(!fs_impl.exists(&dir));
}

#[test]
fn test_create_and_rename() {
    let temp = TempDir::new().unwrap();
    let fs_impl = LocalFileSystem::new();

    let file = temp.path().join("new.txt");
    fs_impl.create_file(&file).unwrap();
    assert!(matches!(
        fs_impl.create_file(&file),
        Err(FsError::AlreadyExists { .. })
    ));

    let dir = temp.path().join("newdir");
    fs_impl.create_dir(&dir).unwrap();
    assert!(fs_impl.is_dir(&dir));

    // Renaming onto an existing entry is refused
    assert!(matches!(
        fs_impl.rename_item(&file, &dir),
        Err(FsError::AlreadyExists { .. })
    ));

    let renamed = temp.path().join("renamed.txt");
    fs_impl.rename_item(&file, &renamed).unwrap();
    assert!(!fs_impl.exists(&file));
    assert!(fs_impl.exists(&renamed));
}

#[test]
fn test_list_directory() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("b.txt"), "").unwrap();
    fs::create_dir(temp.path().join("a")).unwrap();

    let mut names = LocalFileSystem::new().list_directory(temp.path()).unwrap();
    names.sort();
    assert_eq!(names, vec!["a", "b.txt"]);
}

#[test]
fn test_keep_both_path_uses_listing() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("photo.jpg"), "").unwrap();
    fs::write(temp.path().join("photo 2.jpg"), "").unwrap();
    fs::write(temp.path().join("photo 9.png"), "").unwrap();

    let path = keep_both_path(&LocalFileSystem::new(), &temp.path().join("photo.jpg"), false)
        .unwrap();
    assert_eq!(path, temp.path().join("photo 3.jpg"));
}

#[test]
fn test_trash_to_staging_directory() {
    let temp = TempDir::new().unwrap();
    let trash = temp.path().join(".trash");
    let fs_impl = LocalFileSystem::with_trash_dir(&trash);

    let dir = temp.path().join("old");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("inside.txt"), "keep me").unwrap();

    fs_impl.move_to_trash(&dir).unwrap();

    assert!(!dir.exists());
    assert_eq!(
        fs::read_to_string(trash.join("old/inside.txt")).unwrap(),
        "keep me"
    );
    assert!(matches!(
        fs_impl.move_to_trash(&dir),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn test_config_load_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        "workers = 2\nmax_backlog = 10\nhistory_limit = 5\ntrash_dir = \"/tmp/ferry-trash\"\n",
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.workers, 2);
    assert_eq!(config.max_backlog, Some(10));
    assert_eq!(config.history_limit, 5);
    assert_eq!(config.shutdown_timeout_ms, 5000);
}

#[test]
fn test_config_load_errors() {
    let temp = TempDir::new().unwrap();

    let missing = EngineConfig::load(&temp.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::Read { .. }));

    let bad = temp.path().join("bad.toml");
    fs::write(&bad, "workers = \"many\"\n").unwrap();
    assert!(matches!(
        EngineConfig::load(&bad).unwrap_err(),
        ConfigError::Parse { .. }
    ));

    let zero = temp.path().join("zero.toml");
    fs::write(&zero, "workers = 0\n").unwrap();
    assert!(matches!(
        EngineConfig::load(&zero).unwrap_err(),
        ConfigError::Invalid { .. }
    ));
}
