use anyhow::Result;
use keyscout::scan::{scan, scan_with, ThreadDispatch};
use keyscout::{
    CollectionStatus, ConcurrencyModel, EncodingMode, ScanConfig, ScanError, WorkerCommand,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

fn keywords() -> Vec<String> {
    vec!["python".to_string(), "data".to_string(), "missing".to_string()]
}

fn worker_command() -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_keyscout-worker"))
}

fn config_for(dir: &Path, model: ConcurrencyModel, workers: usize) -> ScanConfig {
    let mut config = ScanConfig::new(dir, keywords());
    config.worker_count = workers;
    config.model = model;
    config.worker_command = Some(worker_command());
    config
}

fn set_of(dir: &Path, names: &[&str]) -> BTreeSet<PathBuf> {
    names.iter().map(|name| dir.join(name)).collect()
}

/// a.txt and b.txt are readable, c.txt points nowhere
#[cfg(unix)]
fn create_scenario() -> Result<TempDir> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.txt"), "python programming")?;
    fs::write(dir.path().join("b.txt"), "data structure")?;
    std::os::unix::fs::symlink(dir.path().join("gone.bin"), dir.path().join("c.txt"))?;
    Ok(dir)
}

fn create_corpus(file_count: usize) -> Result<TempDir> {
    let dir = tempdir()?;
    for i in 0..file_count {
        let text = match i % 3 {
            0 => format!("File {} talks about Python and big DATA", i),
            1 => format!("File {} mentions pythonic code only", i),
            _ => format!("File {} has some data:frames", i),
        };
        fs::write(dir.path().join(format!("doc_{:03}.txt", i)), text)?;
    }
    fs::write(dir.path().join("skipped.md"), "python data")?;
    Ok(dir)
}

#[cfg(unix)]
#[test]
fn test_scenario_with_unreadable_file() -> Result<()> {
    let dir = create_scenario()?;

    for model in [ConcurrencyModel::Threads, ConcurrencyModel::Processes] {
        let result = scan(&config_for(dir.path(), model, 2))?;

        assert_eq!(result.file_set("python"), set_of(dir.path(), &["a.txt"]));
        assert_eq!(result.file_set("data"), set_of(dir.path(), &["b.txt"]));
        assert!(result.file_set("missing").is_empty());
        assert!(result.matches.contains_key("missing"));
        assert_eq!(result.files_processed, 2, "{:?}", model);
        assert_eq!(result.errors, 1, "{:?}", model);
        assert_eq!(result.files_discovered, 3);
        assert_eq!(result.workers_spawned, 2);
        assert_eq!(result.workers_reported, 2);
        assert_eq!(result.collection, CollectionStatus::Complete);
    }
    Ok(())
}

#[test]
fn test_undecodable_file_counts_as_error_in_fail_fast_mode() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.txt"), "python programming")?;
    fs::write(dir.path().join("b.txt"), "data structure")?;
    fs::write(dir.path().join("c.txt"), [0x64, 0x61, 0xff, 0xfe, 0x74, 0x61])?;

    for model in [ConcurrencyModel::Threads, ConcurrencyModel::Processes] {
        let mut config = config_for(dir.path(), model, 2);
        config.encoding_mode = EncodingMode::FailFast;
        let result = scan(&config)?;

        assert_eq!(result.file_set("python"), set_of(dir.path(), &["a.txt"]));
        assert_eq!(result.file_set("data"), set_of(dir.path(), &["b.txt"]));
        assert_eq!(result.files_processed, 2);
        assert_eq!(result.errors, 1);
    }
    Ok(())
}

#[test]
fn test_invalid_bytes_are_dropped_by_default() -> Result<()> {
    let dir = tempdir()?;
    let mut bytes = b"big ".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    bytes.extend_from_slice(b" data here");
    fs::write(dir.path().join("mixed.txt"), bytes)?;

    let result = scan(&config_for(dir.path(), ConcurrencyModel::Threads, 1))?;
    assert_eq!(result.file_set("data"), set_of(dir.path(), &["mixed.txt"]));
    assert_eq!(result.errors, 0);
    Ok(())
}

#[test]
fn test_models_agree() -> Result<()> {
    let dir = create_corpus(30)?;

    let threads = scan(&config_for(dir.path(), ConcurrencyModel::Threads, 4))?;
    let processes = scan(&config_for(dir.path(), ConcurrencyModel::Processes, 4))?;

    assert_eq!(threads.file_sets(), processes.file_sets());
    assert_eq!(threads.files_processed, 30);
    assert_eq!(processes.files_processed, 30);
    assert_eq!(threads.file_set("python").len(), 10);
    assert_eq!(threads.file_set("data").len(), 20);
    assert!(threads.file_set("missing").is_empty());
    Ok(())
}

#[test]
fn test_repeated_scans_are_identical() -> Result<()> {
    let dir = create_corpus(12)?;
    let config = config_for(dir.path(), ConcurrencyModel::Threads, 3);

    let first = scan(&config)?;
    let second = scan(&config)?;
    assert_eq!(first.file_sets(), second.file_sets());
    assert_eq!(first.files_processed, second.files_processed);
    assert_eq!(first.errors, second.errors);
    Ok(())
}

#[test]
fn test_result_independent_of_worker_count() -> Result<()> {
    let dir = create_corpus(17)?;
    let baseline = scan(&config_for(dir.path(), ConcurrencyModel::Threads, 1))?;

    for workers in [2, 5, 17, 40] {
        let result = scan(&config_for(dir.path(), ConcurrencyModel::Threads, workers))?;
        assert_eq!(result.file_sets(), baseline.file_sets(), "{} workers", workers);
        assert_eq!(result.files_processed, 17);
    }
    Ok(())
}

#[test]
fn test_more_workers_than_files() -> Result<()> {
    let dir = create_corpus(3)?;

    for model in [ConcurrencyModel::Threads, ConcurrencyModel::Processes] {
        let result = scan(&config_for(dir.path(), model, 10))?;
        assert_eq!(result.workers_requested, 10);
        assert_eq!(result.workers_spawned, 3);
        assert_eq!(result.workers_reported, 3);
        assert_eq!(result.files_processed, 3);

        let hits: usize = result.matches.values().map(Vec::len).sum();
        let unique: usize = result.file_sets().values().map(BTreeSet::len).sum();
        assert_eq!(hits, unique, "a file was scanned twice");
    }
    Ok(())
}

#[test]
fn test_empty_directory() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("readme.md"), "python")?;

    for model in [ConcurrencyModel::Threads, ConcurrencyModel::Processes] {
        let result = scan(&config_for(dir.path(), model, 4))?;
        let expected: BTreeMap<String, BTreeSet<PathBuf>> =
            keywords().into_iter().map(|k| (k, BTreeSet::new())).collect();
        assert_eq!(result.file_sets(), expected);
        assert_eq!(result.files_processed, 0);
        assert_eq!(result.errors, 0);
        assert_eq!(result.workers_spawned, 0);
    }
    Ok(())
}

#[test]
fn test_recursive_scan() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("nested/deeper"))?;
    fs::write(dir.path().join("top.txt"), "python")?;
    fs::write(dir.path().join("nested/deeper/low.txt"), "python")?;

    let mut config = config_for(dir.path(), ConcurrencyModel::Threads, 2);
    assert_eq!(scan(&config)?.file_set("python").len(), 1);

    config.recursive = true;
    assert_eq!(
        scan(&config)?.file_set("python"),
        set_of(dir.path(), &["top.txt", "nested/deeper/low.txt"])
    );
    Ok(())
}

#[test]
fn test_missing_directory_is_fatal() {
    let dir = tempdir().unwrap();
    let config = config_for(&dir.path().join("absent"), ConcurrencyModel::Processes, 2);
    assert!(matches!(scan(&config), Err(ScanError::DirectoryNotFound(_))));
}

#[test]
fn test_zero_workers_is_rejected() -> Result<()> {
    let dir = create_corpus(2)?;
    let config = config_for(dir.path(), ConcurrencyModel::Threads, 0);
    assert!(matches!(
        scan_with(&config, &ThreadDispatch::from_config(&config)),
        Err(ScanError::InvalidConfiguration(_))
    ));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_hung_worker_yields_partial_result() -> Result<()> {
    let dir = create_corpus(4)?;
    let mut config = config_for(dir.path(), ConcurrencyModel::Processes, 2);
    config.worker_command = Some(WorkerCommand::new("sh").arg("-c").arg("exec sleep 30"));
    config.collect_timeout = Duration::from_millis(500);
    config.join_timeout = Duration::from_millis(200);

    let started = Instant::now();
    let result = scan(&config)?;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(result.is_partial());
    assert_eq!(result.collection, CollectionStatus::TimedOut { missing: 2 });
    assert_eq!(result.workers_reported, 0);
    assert_eq!(result.workers_terminated, 2);
    assert_eq!(result.files_processed, 0);
    assert!(result.file_set("python").is_empty());
    Ok(())
}

#[test]
fn test_process_model_without_worker_command_is_rejected() -> Result<()> {
    let dir = create_corpus(2)?;
    let mut config = config_for(dir.path(), ConcurrencyModel::Processes, 2);
    config.worker_command = None;

    let started = Instant::now();
    assert!(matches!(
        scan(&config),
        Err(ScanError::InvalidConfiguration(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

/// Runs the real worker for worker 1; every other worker never answers
#[cfg(unix)]
fn first_worker_only() -> WorkerCommand {
    WorkerCommand::new("sh")
        .arg("-c")
        .arg(
            r#"job=$(cat); case "$job" in *'"worker_id":1,'*) printf '%s' "$job" | exec "$0" ;; *) exec sleep 30 ;; esac"#,
        )
        .arg(env!("CARGO_BIN_EXE_keyscout-worker"))
}

#[cfg(unix)]
#[test]
fn test_timed_out_scan_keeps_delivered_results() -> Result<()> {
    let dir = create_corpus(4)?;
    let mut config = config_for(dir.path(), ConcurrencyModel::Processes, 2);
    config.worker_command = Some(first_worker_only());
    config.collect_timeout = Duration::from_secs(2);
    config.join_timeout = Duration::from_millis(300);

    let started = Instant::now();
    let result = scan(&config)?;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.collection, CollectionStatus::TimedOut { missing: 1 });
    assert_eq!(result.workers_spawned, 2);
    assert_eq!(result.workers_reported, 1);
    assert_eq!(result.workers_terminated, 1);
    assert_eq!(result.files_processed, 2);
    assert_eq!(result.errors, 0);
    assert_eq!(result.file_set("python"), set_of(dir.path(), &["doc_000.txt"]));
    assert_eq!(result.file_set("data"), set_of(dir.path(), &["doc_000.txt"]));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_silent_or_garbled_workers_become_fatal_results() -> Result<()> {
    let dir = create_corpus(4)?;

    for script in ["exit 3", "echo nonsense"] {
        let mut config = config_for(dir.path(), ConcurrencyModel::Processes, 2);
        config.worker_command = Some(WorkerCommand::new("sh").arg("-c").arg(script));
        config.join_timeout = Duration::from_secs(2);

        let result = scan(&config)?;
        assert_eq!(result.collection, CollectionStatus::Complete, "{}", script);
        assert_eq!(result.workers_reported, 2, "{}", script);
        assert_eq!(result.fatal_workers, 2, "{}", script);
        assert_eq!(result.files_processed, 0, "{}", script);
        assert_eq!(result.errors, 2, "{}", script);
        assert_eq!(result.workers_terminated, 0, "{}", script);
        assert!(result.file_set("python").is_empty());
    }
    Ok(())
}
