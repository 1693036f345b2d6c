//! Drop folder watcher against a real directory
//!
//! These tests sleep through stability intervals and take a few seconds.

use romdock_common::events::{EventBus, RomdockEvent};
use romdock_import::services::{DirectoryWatcher, WatcherState};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn tc_watch_001_file_reported_only_after_settling() {
    // Given: A watcher with a 2s stability interval over an empty directory
    let dir = TempDir::new().unwrap();
    let interval = Duration::from_secs(2);
    let watcher = DirectoryWatcher::new(dir.path(), interval, EventBus::new(16));
    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(8);
    let shutdown = CancellationToken::new();
    let handle = watcher.start(tx, shutdown.clone()).await.unwrap();

    // When: A file is written in two chunks one second apart
    let path = dir.path().join("Slow.nes");
    std::fs::write(&path, vec![1u8; 1024]).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[2u8; 1024]).unwrap();
    }
    let last_write = Instant::now();

    // Then: Nothing is reported shortly after the second chunk
    let early = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
    assert!(early.is_err(), "file reported before it settled");

    // And: It is reported once its size held for a full interval
    let batch = tokio::time::timeout(Duration::from_secs(6), rx.recv())
        .await
        .expect("file never reported")
        .expect("watcher channel closed");
    assert_eq!(batch, vec![path]);
    assert!(last_write.elapsed() >= interval);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn tc_watch_002_existing_files_reported_at_startup() {
    // Given: A file already present before the watcher starts
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("Early.nes");
    std::fs::write(&existing, b"early").unwrap();
    std::fs::write(dir.path().join(".DS_Store"), b"x").unwrap();

    // When: The watcher starts
    let watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(200), EventBus::new(16));
    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(8);
    let shutdown = CancellationToken::new();
    let handle = watcher.start(tx, shutdown.clone()).await.unwrap();

    // Then: The visible file goes out as the first batch
    let batch = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("startup batch missing")
        .expect("watcher channel closed");
    assert_eq!(batch, vec![existing]);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn tc_watch_003_shutdown_returns_to_idle() {
    // Given: A running watcher
    let dir = TempDir::new().unwrap();
    let watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(200), EventBus::new(16));
    let mut state = watcher.subscribe_state();
    let (tx, _rx) = mpsc::channel::<Vec<PathBuf>>(8);
    let shutdown = CancellationToken::new();
    let handle = watcher.start(tx, shutdown.clone()).await.unwrap();
    assert_eq!(*state.borrow_and_update(), WatcherState::Watching);

    // When: Shutdown fires
    shutdown.cancel();
    handle.await.unwrap();

    // Then: The watcher reports Idle
    assert_eq!(*state.borrow(), WatcherState::Idle);
}

fn write_zip(path: &std::path::Path, members: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, bytes) in members {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

async fn next_batch(rx: &mut mpsc::Receiver<Vec<PathBuf>>, within: Duration) -> Vec<PathBuf> {
    let mut batch = tokio::time::timeout(within, rx.recv())
        .await
        .expect("no batch reported")
        .expect("watcher channel closed");
    batch.sort();
    batch
}

#[tokio::test]
async fn tc_watch_004_disc_image_and_tracks_reported_together() {
    // Given: A running watcher with a short stability interval
    let dir = TempDir::new().unwrap();
    let watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(400), EventBus::new(16));
    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(8);
    let shutdown = CancellationToken::new();
    let handle = watcher.start(tx, shutdown.clone()).await.unwrap();

    // When: A cue lands complete while its track keeps growing for a while
    let cue = dir.path().join("Game.cue");
    let track = dir.path().join("Game (Track 1).bin");
    std::fs::write(&cue, b"FILE \"Game (Track 1).bin\" BINARY\n").unwrap();
    std::fs::write(&track, vec![0u8; 512]).unwrap();
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut file = std::fs::OpenOptions::new().append(true).open(&track).unwrap();
        file.write_all(&[1u8; 512]).unwrap();
    }

    // Then: Both arrive in one batch once the track settles
    let batch = next_batch(&mut rx, Duration::from_secs(5)).await;
    let mut expected = vec![cue, track];
    expected.sort();
    assert_eq!(batch, expected);
    assert!(
        tokio::time::timeout(Duration::from_millis(1000), rx.recv()).await.is_err(),
        "no second batch expected"
    );

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn tc_watch_005_settled_archive_extracted_and_removed() {
    // Given: A running watcher
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(200), bus);
    let state = watcher.subscribe_state();
    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(8);
    let shutdown = CancellationToken::new();
    let handle = watcher.start(tx, shutdown.clone()).await.unwrap();

    // When: An archive is dropped
    let staging = TempDir::new().unwrap();
    let staged = staging.path().join("pack.zip");
    write_zip(&staged, &[("Alpha.nes", b"alpha"), ("Beta.nes", b"beta")]);
    let archive = dir.path().join("pack.zip");
    std::fs::rename(&staged, &archive)
        .or_else(|_| std::fs::copy(&staged, &archive).map(|_| ()))
        .unwrap();

    // Then: Its members are reported and the archive is gone
    let batch = next_batch(&mut rx, Duration::from_secs(3)).await;
    assert_eq!(
        batch,
        vec![dir.path().join("Alpha.nes"), dir.path().join("Beta.nes")]
    );
    assert!(!archive.exists());

    // And: Monitoring was paused for the extraction and has resumed
    let mut started = false;
    while let Ok(event) = events.try_recv() {
        if let RomdockEvent::ArchiveInflationStarted { path, .. } = event {
            started = path == archive;
        }
    }
    assert!(started, "extraction start announced");
    assert_eq!(*state.borrow(), WatcherState::Watching);

    // And: The extracted members are not reported a second time
    assert!(tokio::time::timeout(Duration::from_millis(800), rx.recv())
        .await
        .is_err());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn tc_watch_006_broken_archive_kept_and_watching_resumes() {
    // Given: A running watcher
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(200), bus);
    let state = watcher.subscribe_state();
    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(8);
    let shutdown = CancellationToken::new();
    let handle = watcher.start(tx, shutdown.clone()).await.unwrap();

    // When: A file that only claims to be a zip is dropped
    let archive = dir.path().join("broken.zip");
    std::fs::write(&archive, b"not a zip at all").unwrap();

    // Then: The failure is announced and the archive stays
    let failed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match events.recv().await {
                Ok(RomdockEvent::ArchiveInflationFailed { path, .. }) => break path,
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {}", e),
            }
        }
    })
    .await
    .expect("no extraction failure announced");
    assert_eq!(failed, archive);
    assert!(archive.exists());
    assert_eq!(*state.borrow(), WatcherState::Watching);

    // And: Files dropped afterwards are still reported
    let later = dir.path().join("Later.nes");
    std::fs::write(&later, b"later").unwrap();
    let batch = next_batch(&mut rx, Duration::from_secs(3)).await;
    assert_eq!(batch, vec![later]);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn tc_watch_007_archive_present_at_startup_extracted() {
    // Given: An archive and a loose ROM already in the directory
    let dir = TempDir::new().unwrap();
    write_zip(&dir.path().join("old.zip"), &[("Inner.nes", b"inner")]);
    std::fs::write(dir.path().join("Loose.nes"), b"loose").unwrap();

    // When: The watcher starts
    let watcher = DirectoryWatcher::new(dir.path(), Duration::from_millis(200), EventBus::new(16));
    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(8);
    let shutdown = CancellationToken::new();
    let handle = watcher.start(tx, shutdown.clone()).await.unwrap();

    // Then: The startup batch holds the member and the loose file, not the archive
    let batch = next_batch(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(
        batch,
        vec![dir.path().join("Inner.nes"), dir.path().join("Loose.nes")]
    );
    assert!(!dir.path().join("old.zip").exists());

    shutdown.cancel();
    handle.await.unwrap();
}
