//! Config loading from disk: error messages, defaults, overlap validation.

use std::path::PathBuf;

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use strm_core::{config, ConfigError};

const TWO_MAPPINGS: &str = r#"
sync:
  real_time_monitor: true
  run_full_task_on_startup: true
  cron_full_process:
    enable: true
    cron_expression: "*/30 * * * *"
    files_per_second_limit: 0
  overwrite_existing: false
  sync_source_dest: true
  cleanup_empty_dirs: true
  preserve_extra_metadata: true
  sync_metadata_to_source: false
  stop_on_mount_loss: true
  monitor_confs:
    - source_dir: ["media/movies", "media/movies-4k"]
      dest_dir: "strm/movies"
      library_dir: "/library/movies"
      video_extensions: [".mp4", ".mkv"]
      metadata_extensions: [".nfo", ".jpg", ".srt"]
      create_strm: true
      copy_metadata: true
    - source_dir: "media/shows"
      dest_dir: "strm/shows"
      library_dir: "/library/shows"
      video_extensions: [".mkv"]
      metadata_extensions: [".nfo"]
      create_strm: true
      copy_metadata: false
"#;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_file_returns_io_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("absent.yaml");
    let err = config::load_at(&path, dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(file.path(), dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_without_sync_section_fails_closed() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("real_time_monitor: true\n").expect("write");

    let err = config::load_at(file.path(), dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    let ConfigError::Parse { source, .. } = &err else {
        unreachable!()
    };
    assert!(source.to_string().contains("sync"), "got: {source}");
}

// ---------------------------------------------------------------------------
// 2. Successful load
// ---------------------------------------------------------------------------

#[test]
fn load_two_mappings_normalizes_relative_roots() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(TWO_MAPPINGS).expect("write");
    file.assert(predicate::path::is_file());

    let config = config::load_at(file.path(), dir.path()).expect("load");
    assert!(config.real_time_monitor);
    assert!(config.run_full_task_on_startup);
    assert!(config.policy.preserve_extra_metadata);
    assert_eq!(config.mappings.len(), 2);

    let movies = &config.mappings[0];
    assert_eq!(
        movies.source_roots,
        vec![
            dir.path().join("media/movies"),
            dir.path().join("media/movies-4k")
        ]
    );
    assert_eq!(movies.dest_root, dir.path().join("strm/movies"));
    assert_eq!(movies.library_root, PathBuf::from("/library/movies"));

    let shows = &config.mappings[1];
    assert!(!shows.copy_metadata);
    assert_eq!(shows.source_roots.len(), 1);
}

// ---------------------------------------------------------------------------
// 3. Structural validation
// ---------------------------------------------------------------------------

#[test]
fn nested_destination_roots_are_rejected() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(&TWO_MAPPINGS.replace("dest_dir: \"strm/shows\"", "dest_dir: \"strm/movies/shows\""))
        .expect("write");

    let err = config::load_at(file.path(), dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "got: {err}");
    assert!(err.to_string().contains("overlaps"));
}

#[test]
fn empty_pointer_extension_is_rejected() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(&TWO_MAPPINGS.replace(
        "  stop_on_mount_loss: true\n",
        "  stop_on_mount_loss: true\n  pointer_extension: \".\"\n",
    ))
    .expect("write");

    let err = config::load_at(file.path(), dir.path()).unwrap_err();
    assert!(err.to_string().contains("pointer_extension"), "got: {err}");
}
