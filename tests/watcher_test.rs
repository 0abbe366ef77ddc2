use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use filetime::FileTime;
use tempfile::TempDir;
use treewatch::config::InitialEvents;
use treewatch::fs::FsPath;
use treewatch::watcher::{
    EventListener, FileSystemEvent, PollingWatcher, Service, ServiceStatus, Subscribable,
    ThreadScheduler, TokioScheduler, Watchable,
};

const WAIT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(250);

struct Fixture {
    watcher: PollingWatcher,
    events: Receiver<FileSystemEvent>,
    root: PathBuf,
    _temp_dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self::with(PollingWatcher::builder().build().unwrap())
    }

    fn with(watcher: PollingWatcher) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let (tx, events) = unbounded();
        watcher.subscribe(Arc::new(move |event: &FileSystemEvent| {
            let _ = tx.send(event.clone());
        }));
        Self {
            watcher,
            events,
            root,
            _temp_dir: temp_dir,
        }
    }

    fn root_path(&self) -> FsPath {
        FsPath::from_path(&self.root).unwrap()
    }

    fn watch(&self) {
        self.watcher.watch(&self.root_path()).unwrap();
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Receive exactly `count` events, then require silence.
    fn expect(&self, count: usize) -> Vec<String> {
        let received: Vec<String> = (0..count)
            .map(|i| {
                let event = self
                    .events
                    .recv_timeout(WAIT)
                    .unwrap_or_else(|_| panic!("timed out waiting for event {}", i + 1));
                describe(&event, &self.root)
            })
            .collect();
        self.expect_none();
        received
    }

    fn expect_none(&self) {
        if let Ok(event) = self.events.recv_timeout(QUIET) {
            panic!("unexpected event {}", describe(&event, &self.root));
        }
    }
}

/// `TAG relative/path`, or `TAG .` for the root itself.
fn describe(event: &FileSystemEvent, root: &Path) -> String {
    let relative = event
        .path()
        .absolute()
        .strip_prefix(root)
        .unwrap()
        .to_string_lossy()
        .into_owned();
    let relative = if relative.is_empty() {
        ".".to_string()
    } else {
        relative.replace('\\', "/")
    };
    format!("{} {relative}", event.tag())
}

#[test]
fn test_created_then_deleted_files() {
    let fixture = Fixture::new();
    fixture.watch();

    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(fixture.path(name), name).unwrap();
    }
    assert_eq!(fixture.watcher.poll_now(), 3);
    assert_eq!(
        fixture.expect(3),
        vec![
            "FILE_CREATED a.txt",
            "FILE_CREATED b.txt",
            "FILE_CREATED c.txt"
        ]
    );

    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::remove_file(fixture.path(name)).unwrap();
    }
    fixture.watcher.poll_now();
    let mut deleted = fixture.expect(3);
    deleted.sort();
    assert_eq!(
        deleted,
        vec![
            "FILE_DELETED a.txt",
            "FILE_DELETED b.txt",
            "FILE_DELETED c.txt"
        ]
    );

    // Nothing left to report
    assert_eq!(fixture.watcher.poll_now(), 0);
    fixture.expect_none();
}

#[test]
fn test_existing_contents_are_the_baseline() {
    let fixture = Fixture::new();
    fs::write(fixture.path("old.txt"), "x").unwrap();
    fs::create_dir(fixture.path("old_dir")).unwrap();
    fixture.watch();

    assert_eq!(fixture.watcher.poll_now(), 0);
    assert_eq!(fixture.watcher.poll_now(), 0);
    fixture.expect_none();
}

#[test]
fn test_deleted_directory_cascades() {
    let fixture = Fixture::new();
    let doomed = fixture.path("doomed");
    fs::create_dir_all(doomed.join("inner")).unwrap();
    for i in 0..4 {
        fs::write(doomed.join(format!("f{i}.txt")), "x").unwrap();
    }
    fs::write(doomed.join("inner").join("deep.txt"), "x").unwrap();
    fixture.watch();

    fs::remove_dir_all(&doomed).unwrap();
    // 4 files, inner/, inner/deep.txt and doomed/ itself
    assert_eq!(fixture.watcher.poll_now(), 7);

    let events = fixture.expect(7);
    assert!(events.iter().all(|e| e.contains("_DELETED")));
    assert_eq!(events.last().unwrap(), "DIR_DELETED doomed");

    let inner = events.iter().position(|e| e == "DIR_DELETED doomed/inner").unwrap();
    let deep = events
        .iter()
        .position(|e| e == "FILE_DELETED doomed/inner/deep.txt")
        .unwrap();
    assert!(deep < inner, "child reported after its directory: {events:?}");
}

#[test]
fn test_new_directory_reports_parent_first() {
    let fixture = Fixture::new();
    fixture.watch();

    fs::create_dir_all(fixture.path("d/e")).unwrap();
    fs::write(fixture.path("d/x.txt"), "x").unwrap();
    fixture.watcher.poll_now();

    assert_eq!(
        fixture.expect(3),
        vec!["DIR_CREATED d", "DIR_CREATED d/e", "FILE_CREATED d/x.txt"]
    );
}

#[test]
fn test_subsecond_mtime_change_is_one_modification() {
    let fixture = Fixture::new();
    let file = fixture.path("a.txt");
    fs::write(&file, "content").unwrap();
    filetime::set_file_mtime(&file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    fixture.watch();

    filetime::set_file_mtime(&file, FileTime::from_unix_time(1_600_000_000, 500_000_000))
        .unwrap();
    fixture.watcher.poll_now();
    assert_eq!(fixture.expect(1), vec!["FILE_MODIFIED a.txt"]);

    assert_eq!(fixture.watcher.poll_now(), 0);
}

#[test]
fn test_modification_carries_old_and_new_attributes() {
    let fixture = Fixture::new();
    let file = fixture.path("grow.txt");
    fs::write(&file, "1").unwrap();
    fixture.watch();

    fs::write(&file, "12345").unwrap();
    filetime::set_file_mtime(&file, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    fixture.watcher.poll_now();

    match fixture.events.recv_timeout(WAIT).unwrap() {
        FileSystemEvent::FileModified { old, now, .. } => {
            assert_eq!(old.unwrap().size, 1);
            assert_eq!(now.unwrap().size, 5);
        }
        other => panic!("unexpected event {other}"),
    }
}

#[test]
fn test_transient_file_is_invisible() {
    let fixture = Fixture::new();
    fixture.watch();

    let file = fixture.path("blink.txt");
    fs::write(&file, "x").unwrap();
    fs::remove_file(&file).unwrap();

    assert_eq!(fixture.watcher.poll_now(), 0);
    fixture.expect_none();
}

#[test]
fn test_unwatch_stops_events() {
    let fixture = Fixture::new();
    fixture.watch();

    assert!(fixture.watcher.unwatch(&fixture.root_path()));
    assert!(!fixture.watcher.unwatch(&fixture.root_path()));

    fs::write(fixture.path("late.txt"), "x").unwrap();
    assert_eq!(fixture.watcher.poll_now(), 0);
    fixture.expect_none();
}

#[test]
fn test_unwatch_waits_for_delivery_in_progress() {
    let temp_dir = TempDir::new().unwrap();
    let root = FsPath::from_path(temp_dir.path()).unwrap();
    let watcher = PollingWatcher::builder().build().unwrap();

    let (entered_tx, entered) = unbounded();
    let (release_tx, release) = unbounded::<()>();
    let (seen_tx, seen) = unbounded();
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);
    watcher.subscribe(Arc::new(move |event: &FileSystemEvent| {
        let _ = entered_tx.send(());
        let _ = release.recv_timeout(WAIT);
        flag.store(true, Ordering::SeqCst);
        let _ = seen_tx.send(event.tag());
    }));

    watcher.watch(&root).unwrap();
    fs::write(temp_dir.path().join("a.txt"), "x").unwrap();
    fs::write(temp_dir.path().join("b.txt"), "x").unwrap();
    assert_eq!(watcher.poll_now(), 2);
    entered.recv_timeout(WAIT).unwrap();

    std::thread::scope(|scope| {
        let (done_tx, done) = unbounded();
        let (watcher, root) = (&watcher, &root);
        scope.spawn(move || {
            let _ = done_tx.send(watcher.unwatch(root));
        });

        assert!(
            done.recv_timeout(QUIET).is_err(),
            "unwatch returned while a delivery was running"
        );
        release_tx.send(()).unwrap();
        assert!(done.recv_timeout(WAIT).unwrap());
        assert!(finished.load(Ordering::SeqCst));
    });

    // The delivery in progress completes; b.txt never reaches the listener.
    assert_eq!(seen.recv_timeout(WAIT).unwrap(), "FILE_CREATED");
    assert!(entered.recv_timeout(QUIET).is_err());
    assert!(seen.recv_timeout(QUIET).is_err());
}

#[test]
fn test_listeners_unwatching_each_others_roots() {
    let temp_dir = TempDir::new().unwrap();
    let first = FsPath::from_path(temp_dir.path().join("first")).unwrap();
    let second = FsPath::from_path(temp_dir.path().join("second")).unwrap();
    fs::create_dir(first.absolute()).unwrap();
    fs::create_dir(second.absolute()).unwrap();

    // Two workers, so each listener delivers on its own thread.
    let watcher = Arc::new(PollingWatcher::builder().build().unwrap());
    let barrier = Arc::new(Barrier::new(2));
    let (tx, unwatched) = unbounded();

    let cross = |mine: &FsPath, other: &FsPath| -> Arc<dyn EventListener> {
        let (mine, other) = (mine.clone(), other.clone());
        let watcher = Arc::downgrade(&watcher);
        let barrier = Arc::clone(&barrier);
        let tx = tx.clone();
        Arc::new(move |event: &FileSystemEvent| {
            if !event.path().absolute().starts_with(mine.absolute()) {
                return;
            }
            // Both listeners are inside a delivery before either unwatches.
            barrier.wait();
            if let Some(watcher) = watcher.upgrade() {
                let _ = tx.send(watcher.unwatch(&other));
            }
        })
    };
    watcher.subscribe(cross(&first, &second));
    watcher.subscribe(cross(&second, &first));

    watcher.watch(&first).unwrap();
    watcher.watch(&second).unwrap();
    fs::write(first.absolute().join("a.txt"), "x").unwrap();
    fs::write(second.absolute().join("b.txt"), "x").unwrap();
    assert_eq!(watcher.poll_now(), 2);

    assert!(unwatched.recv_timeout(WAIT).unwrap());
    assert!(unwatched.recv_timeout(WAIT).unwrap());
    assert!(watcher.watched_roots().is_empty());

    // Both workers are still alive.
    let (tx, after) = unbounded();
    watcher.subscribe(Arc::new(move |event: &FileSystemEvent| {
        let _ = tx.send(event.tag());
    }));
    let third = FsPath::from_path(temp_dir.path().join("third")).unwrap();
    fs::create_dir(third.absolute()).unwrap();
    watcher.watch(&third).unwrap();
    fs::write(third.absolute().join("c.txt"), "x").unwrap();
    watcher.poll_now();
    assert_eq!(after.recv_timeout(WAIT).unwrap(), "FILE_CREATED");
}

#[test]
fn test_vanished_root_reports_itself() {
    let fixture = Fixture::new();
    let watched = fixture.path("watched");
    fs::create_dir(&watched).unwrap();
    fs::write(watched.join("a.txt"), "x").unwrap();
    let root = FsPath::from_path(&watched).unwrap();
    fixture.watcher.watch(&root).unwrap();

    fs::remove_dir_all(&watched).unwrap();
    fixture.watcher.poll_now();

    assert_eq!(
        fixture.expect(2),
        vec!["FILE_DELETED watched/a.txt", "DIR_DELETED watched"]
    );
    assert!(fixture.watcher.watched_roots().is_empty());
}

#[test]
fn test_synthesized_initial_events() {
    let watcher = PollingWatcher::builder()
        .initial_events(InitialEvents::Synthesize)
        .build()
        .unwrap();
    let fixture = Fixture::with(watcher);
    fs::create_dir(fixture.path("d")).unwrap();
    fs::write(fixture.path("d/x.txt"), "x").unwrap();
    fs::write(fixture.path("top.txt"), "x").unwrap();
    fixture.watch();

    assert_eq!(
        fixture.expect(3),
        vec!["DIR_CREATED d", "FILE_CREATED top.txt", "FILE_CREATED d/x.txt"]
    );
    assert_eq!(fixture.watcher.poll_now(), 0);
}

#[test]
fn test_every_listener_sees_every_event() {
    let fixture = Fixture::new();
    let (tx, second) = unbounded();
    let listener: Arc<dyn EventListener> = Arc::new(move |event: &FileSystemEvent| {
        let _ = tx.send(event.tag());
    });
    assert!(fixture.watcher.subscribe(Arc::clone(&listener)));
    assert!(!fixture.watcher.subscribe(Arc::clone(&listener)));
    fixture.watch();

    fs::write(fixture.path("one.txt"), "x").unwrap();
    fs::write(fixture.path("two.txt"), "x").unwrap();
    fixture.watcher.poll_now();

    assert_eq!(fixture.expect(2).len(), 2);
    for _ in 0..2 {
        assert_eq!(second.recv_timeout(WAIT).unwrap(), "FILE_CREATED");
    }

    assert!(fixture.watcher.unsubscribe(&listener));
    fs::write(fixture.path("three.txt"), "x").unwrap();
    fixture.watcher.poll_now();
    fixture.expect(1);
    assert!(second.recv_timeout(QUIET).is_err());
}

#[test]
fn test_watch_rejects_files_and_missing_paths() {
    let fixture = Fixture::new();
    fs::write(fixture.path("plain.txt"), "x").unwrap();

    assert!(
        fixture
            .watcher
            .watch(&FsPath::from_path(fixture.path("plain.txt")).unwrap())
            .is_err()
    );
    assert!(
        fixture
            .watcher
            .watch(&FsPath::from_path(fixture.path("missing")).unwrap())
            .is_err()
    );
    assert!(fixture.watcher.watched_roots().is_empty());
}

#[test]
fn test_thread_scheduler_drives_polls() {
    let watcher = PollingWatcher::builder()
        .poll_interval(Duration::from_millis(20))
        .scheduler(ThreadScheduler::named("test-poll"))
        .build()
        .unwrap();
    let fixture = Fixture::with(watcher);
    fixture.watch();

    fixture.watcher.start().unwrap();
    assert_eq!(fixture.watcher.status(), ServiceStatus::Running);

    fs::write(fixture.path("tick.txt"), "x").unwrap();
    let event = fixture.events.recv_timeout(WAIT).unwrap();
    assert_eq!(describe(&event, &fixture.root), "FILE_CREATED tick.txt");

    fixture.watcher.stop();
    assert_eq!(fixture.watcher.status(), ServiceStatus::Stopped);
    // A poll may have caught tick.txt before its content was written.
    while fixture.events.recv_timeout(QUIET).is_ok() {}

    fs::write(fixture.path("after_stop.txt"), "x").unwrap();
    fixture.expect_none();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_scheduler_drives_polls() {
    let watcher = PollingWatcher::builder()
        .poll_interval(Duration::from_millis(20))
        .scheduler(TokioScheduler::current().unwrap())
        .build()
        .unwrap();
    let fixture = Fixture::with(watcher);
    fixture.watch();
    fixture.watcher.start().unwrap();

    fs::write(fixture.path("tick.txt"), "x").unwrap();
    let events = fixture.events.clone();
    let event = tokio::task::spawn_blocking(move || events.recv_timeout(WAIT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(describe(&event, &fixture.root), "FILE_CREATED tick.txt");

    fixture.watcher.stop();
}
