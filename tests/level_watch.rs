//! Live level reload tests against a temporary mount directory.

use std::time::Duration;

use levelwatch::config::AllowListScope;
use levelwatch::{LevelSources, LevelWatcher, Logger, Severity, Shutdown, WatchError};

mod common;
use common::{wait_for_level, Mount, SETTLE};

const RELOAD: Duration = Duration::from_secs(5);

fn watcher(sources: LevelSources, logger: &Logger) -> LevelWatcher {
    LevelWatcher::new(sources, logger.clone()).with_settle(SETTLE)
}

#[tokio::test]
async fn test_rename_over_is_picked_up() {
    let mount = Mount::new();
    mount.replace("log_level", "debug\n");
    let logger = Logger::new("main", Severity::Info);
    let shutdown = Shutdown::new();

    let handle = watcher(LevelSources::new(mount.level_path()), &logger)
        .start(shutdown.subscribe())
        .unwrap();
    assert_eq!(logger.level(), Severity::Debug);
    assert!(logger.enabled(Severity::Debug));

    mount.replace("log_level", "warn\n");
    assert!(wait_for_level(&logger, Severity::Warn, RELOAD).await);
    assert!(!logger.enabled(Severity::Debug));
    assert!(logger.enabled(Severity::Warn));

    // The watch survived the first replacement.
    mount.replace("log_level", "error");
    assert!(wait_for_level(&logger, Severity::Error, RELOAD).await);

    shutdown.trigger();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_in_place_write_is_picked_up() {
    let mount = Mount::new();
    mount.overwrite("log_level", "info");
    let logger = Logger::new("main", Severity::Error);
    let shutdown = Shutdown::new();

    let handle = watcher(LevelSources::new(mount.level_path()), &logger)
        .start(shutdown.subscribe())
        .unwrap();
    assert_eq!(logger.level(), Severity::Info);

    mount.overwrite("log_level", "TRACE");
    assert!(wait_for_level(&logger, Severity::Trace, RELOAD).await);

    shutdown.trigger();
    assert!(handle.await.unwrap().is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_swap_is_picked_up() {
    let mount = Mount::new();
    std::fs::create_dir(mount.path("v1")).unwrap();
    std::fs::create_dir(mount.path("v2")).unwrap();
    mount.overwrite("v1/log_level", "info");
    mount.overwrite("v2/log_level", "debug");
    common::swap_symlink(&mount.level_path(), &mount.path("v1/log_level"));

    let logger = Logger::new("main", Severity::Error);
    let shutdown = Shutdown::new();
    let handle = watcher(LevelSources::new(mount.level_path()), &logger)
        .start(shutdown.subscribe())
        .unwrap();
    assert_eq!(logger.level(), Severity::Info);

    // Swap the link, then retire the old version the way a volume update does.
    common::swap_symlink(&mount.level_path(), &mount.path("v2/log_level"));
    std::fs::remove_dir_all(mount.path("v1")).unwrap();
    assert!(wait_for_level(&logger, Severity::Debug, RELOAD).await);

    shutdown.trigger();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_remove_then_recreate_is_picked_up() {
    let mount = Mount::new();
    mount.overwrite("log_level", "debug");
    let logger = Logger::new("main", Severity::Info);
    let shutdown = Shutdown::new();

    let handle = watcher(LevelSources::new(mount.level_path()), &logger)
        .start(shutdown.subscribe())
        .unwrap();
    assert_eq!(logger.level(), Severity::Debug);

    std::fs::remove_file(mount.level_path()).unwrap();
    mount.overwrite("log_level", "warn");
    assert!(wait_for_level(&logger, Severity::Warn, RELOAD).await);
    assert!(!handle.is_finished());

    shutdown.trigger();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_recreate_after_gap_fails_registration() {
    let mount = Mount::new();
    mount.overwrite("log_level", "debug");
    let logger = Logger::new("main", Severity::Info);
    let shutdown = Shutdown::new();

    let handle = watcher(LevelSources::new(mount.level_path()), &logger)
        .start(shutdown.subscribe())
        .unwrap();

    std::fs::remove_file(mount.level_path()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    mount.overwrite("log_level", "warn");

    let result = tokio::time::timeout(RELOAD, handle).await.unwrap().unwrap();
    match result {
        Err(WatchError::Registration { path, .. }) => assert_eq!(path, mount.level_path()),
        other => panic!("expected registration error, got {other:?}"),
    }
    assert_eq!(logger.level(), Severity::Debug);
}

#[tokio::test]
async fn test_allow_list_gates_debug() {
    let mount = Mount::new();
    mount.replace("log_level", "debug");
    mount.replace("log_debug_modules", " loader , ,");
    let sources = LevelSources::new(mount.level_path()).with_debug_modules(mount.modules_path());
    let scope = AllowListScope::AllModules;

    let loader = Logger::new("loader", Severity::Info);
    let other = Logger::new("other", Severity::Info);
    let shutdown = Shutdown::new();

    let loader_task = watcher(sources.clone(), &loader)
        .with_allowlist(scope.applies_to("loader"))
        .start(shutdown.subscribe())
        .unwrap();
    let other_task = watcher(sources, &other)
        .with_allowlist(scope.applies_to("other"))
        .start(shutdown.subscribe())
        .unwrap();

    assert!(loader.enabled(Severity::Debug));
    assert!(!other.enabled(Severity::Debug));
    assert!(other.enabled(Severity::Info));

    // Granting `other` the override takes effect through the module file alone.
    mount.replace("log_debug_modules", "loader,other");
    assert!(wait_for_level(&other, Severity::Debug, RELOAD).await);
    assert_eq!(loader.level(), Severity::Debug);

    shutdown.trigger();
    assert!(loader_task.await.unwrap().is_ok());
    assert!(other_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_ungated_logger_ignores_allow_list() {
    let mount = Mount::new();
    mount.replace("log_level", "debug");
    mount.replace("log_debug_modules", "loader");
    let sources = LevelSources::new(mount.level_path()).with_debug_modules(mount.modules_path());
    let scope = AllowListScope::Modules(vec!["loader".to_string()]);

    let processor = Logger::new("processor", Severity::Info);
    let watcher = watcher(sources, &processor).with_allowlist(scope.applies_to("processor"));

    assert_eq!(watcher.apply().unwrap(), (Severity::Info, Severity::Debug));
}

#[tokio::test]
async fn test_invalid_update_stops_watcher() {
    let mount = Mount::new();
    mount.replace("log_level", "info");
    let logger = Logger::new("main", Severity::Info);
    let shutdown = Shutdown::new();

    let handle = watcher(LevelSources::new(mount.level_path()), &logger)
        .start(shutdown.subscribe())
        .unwrap();

    mount.replace("log_level", "loud");
    let result = tokio::time::timeout(RELOAD, handle).await.unwrap().unwrap();
    match result {
        Err(WatchError::Parse { value, .. }) => assert_eq!(value, "loud"),
        other => panic!("expected parse error, got {other:?}"),
    }
    assert_eq!(logger.level(), Severity::Info);
}

#[tokio::test]
async fn test_shutdown_stops_idle_watcher() {
    let mount = Mount::new();
    mount.replace("log_level", "warn");
    let logger = Logger::new("main", Severity::Info);
    let shutdown = Shutdown::new();

    let handle = watcher(LevelSources::new(mount.level_path()), &logger)
        .start(shutdown.subscribe())
        .unwrap();

    shutdown.trigger();
    let result = tokio::time::timeout(RELOAD, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}
