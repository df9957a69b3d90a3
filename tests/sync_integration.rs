//! Sync orchestration against in-memory listing and fetch backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use filesync_core::download::{
    ContentRange, DownloadError, FetchResponse, FileOutcome, NoopProgress, ProgressEvent,
    ProgressSink, RemoteFile, SkipReason,
};
use filesync_core::{
    CancellationCoordinator, FileDownloader, FilterConfig, ListingError, RangeFetch,
    RegexFilter, RemoteListing, RetryPolicy, SyncDirs, SyncOrchestrator,
};
use futures_util::stream;
use tempfile::TempDir;

struct StaticListing(Vec<RemoteFile>);

#[async_trait]
impl RemoteListing for StaticListing {
    async fn list(&self) -> Result<Vec<RemoteFile>, ListingError> {
        Ok(self.0.clone())
    }
}

/// Serves file bodies by URL, honoring start offsets, and records requests.
#[derive(Default)]
struct MemoryServer {
    files: HashMap<String, &'static [u8]>,
    opens: Mutex<Vec<(String, u64)>>,
}

impl MemoryServer {
    fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }
}

#[async_trait]
impl RangeFetch for MemoryServer {
    async fn open(&self, url: &str, start_offset: u64) -> Result<FetchResponse, DownloadError> {
        self.opens
            .lock()
            .unwrap()
            .push((url.to_string(), start_offset));
        let data = *self
            .files
            .get(url)
            .ok_or_else(|| DownloadError::http_status(url, 404))?;
        let total = data.len() as u64;
        let start = usize::try_from(start_offset).unwrap();
        let slice = Bytes::from_static(&data[start..]);
        Ok(FetchResponse {
            status: if start_offset > 0 { 206 } else { 200 },
            content_length: Some(slice.len() as u64),
            content_range: (start_offset > 0).then_some(ContentRange {
                start: start_offset,
                end: total - 1,
                total: Some(total),
            }),
            body: Box::pin(stream::iter(vec![Ok::<_, DownloadError>(slice)])),
        })
    }

    async fn probe_size(&self, url: &str) -> Option<u64> {
        self.files.get(url).map(|data| data.len() as u64)
    }
}

struct Fixture {
    local: TempDir,
    downloads: TempDir,
    server: Arc<MemoryServer>,
    cancel: CancellationCoordinator,
}

impl Fixture {
    fn new(files: &[(&str, &'static str)]) -> Self {
        let server = MemoryServer {
            files: files
                .iter()
                .map(|(name, data)| (url(name), data.as_bytes()))
                .collect(),
            ..MemoryServer::default()
        };
        Self {
            local: TempDir::new().unwrap(),
            downloads: TempDir::new().unwrap(),
            server: Arc::new(server),
            cancel: CancellationCoordinator::new(),
        }
    }

    fn orchestrator(
        &self,
        listing: Vec<RemoteFile>,
        filter: FilterConfig,
        move_completed: bool,
    ) -> SyncOrchestrator {
        let downloader = FileDownloader::new(
            self.server.clone(),
            RetryPolicy::new(3, Duration::ZERO),
            4,
            self.cancel.clone(),
        );
        SyncOrchestrator::new(
            Arc::new(StaticListing(listing)),
            Arc::new(RegexFilter::from_config(&filter).unwrap()),
            Some(".laz".to_string()),
            downloader,
            SyncDirs {
                local_dir: self.local.path().to_path_buf(),
                download_dir: self.downloads.path().to_path_buf(),
                move_completed,
            },
            self.cancel.clone(),
        )
    }
}

fn url(name: &str) -> String {
    format!("http://mirror.test/lidar/{name}")
}

fn remote(name: &str, size: usize) -> RemoteFile {
    RemoteFile::new(name, url(name), Some(size as u64))
}

fn enabled(pattern: &str) -> FilterConfig {
    FilterConfig {
        enabled: true,
        pattern: pattern.to_string(),
        case_sensitive: false,
    }
}

#[tokio::test]
async fn test_disabled_filter_downloads_nothing() {
    let fixture = Fixture::new(&[]);
    let listing: Vec<RemoteFile> = (0..10)
        .map(|i| remote(&format!("tile_{i:02}.laz"), 100))
        .collect();
    let orchestrator = fixture.orchestrator(listing, FilterConfig::default(), false);

    let summary = orchestrator.run(&NoopProgress).await.unwrap();

    assert_eq!(fixture.server.open_count(), 0);
    assert_eq!(summary.filtered_out.len(), 10);
    assert!(summary.files.is_empty());
    assert_eq!(summary.completed(), 0);
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn test_sync_downloads_matching_files_and_skips_present_ones() {
    let fixture = Fixture::new(&[
        ("tile_a.laz", "aaaaaaaaaa"),
        ("tile_b.laz", "bbbbbb"),
        ("tile_c.laz", "cc"),
    ]);
    std::fs::write(fixture.local.path().join("tile_c.laz"), b"cc").unwrap();
    let listing = vec![
        remote("tile_a.laz", 10),
        remote("tile_b.laz", 6),
        remote("tile_c.laz", 2),
        remote("other.laz", 4),
        remote("tile_d.txt", 4),
    ];
    let orchestrator = fixture.orchestrator(listing, enabled("^tile_"), false);

    let summary = orchestrator.run(&NoopProgress).await.unwrap();

    assert_eq!(summary.completed(), 2);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.filtered_out, vec!["other.laz"]);
    assert_eq!(summary.bytes_transferred, 16);
    assert_eq!(
        std::fs::read(fixture.downloads.path().join("tile_a.laz")).unwrap(),
        b"aaaaaaaaaa"
    );
    let skipped = summary
        .files
        .iter()
        .find(|f| f.name == "tile_c.laz")
        .unwrap();
    assert!(matches!(
        skipped.outcome,
        FileOutcome::Skipped {
            reason: SkipReason::AlreadyPresent
        }
    ));
    assert_eq!(fixture.server.open_count(), 2);
}

#[tokio::test]
async fn test_partial_download_resumes_from_disk_length() {
    let fixture = Fixture::new(&[("tile_a.laz", "0123456789")]);
    std::fs::write(fixture.downloads.path().join("tile_a.laz"), b"0123").unwrap();
    let orchestrator = fixture.orchestrator(vec![remote("tile_a.laz", 10)], enabled("tile"), false);

    let plan = orchestrator.plan().await.unwrap();
    assert_eq!(plan.to_download[0].partial_bytes, 4);
    let summary = orchestrator.execute(plan, &NoopProgress).await.unwrap();

    assert_eq!(summary.completed(), 1);
    assert_eq!(summary.bytes_transferred, 6);
    assert_eq!(
        fixture.server.opens.lock().unwrap().as_slice(),
        &[(url("tile_a.laz"), 4)]
    );
    assert_eq!(
        std::fs::read(fixture.downloads.path().join("tile_a.laz")).unwrap(),
        b"0123456789"
    );
}

#[tokio::test]
async fn test_failed_file_does_not_abort_the_pass() {
    // tile_a is listed but missing on the server.
    let fixture = Fixture::new(&[("tile_b.laz", "bbbb")]);
    let listing = vec![remote("tile_a.laz", 4), remote("tile_b.laz", 4)];
    let orchestrator = fixture.orchestrator(listing, enabled("tile"), false);

    let summary = orchestrator.run(&NoopProgress).await.unwrap();

    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.completed(), 1);
    let failures: Vec<_> = summary.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "tile_a.laz");
    assert!(failures[0].1.contains("404"));
}

#[tokio::test]
async fn test_move_completed_relocates_files() {
    let fixture = Fixture::new(&[("tile_a.laz", "abc")]);
    let orchestrator = fixture.orchestrator(vec![remote("tile_a.laz", 3)], enabled("tile"), true);

    let summary = orchestrator.run(&NoopProgress).await.unwrap();

    let moved = fixture.local.path().join("tile_a.laz");
    assert_eq!(std::fs::read(&moved).unwrap(), b"abc");
    assert!(!fixture.downloads.path().join("tile_a.laz").exists());
    match &summary.files[0].outcome {
        FileOutcome::Completed { path, .. } => assert_eq!(path, &moved),
        other => panic!("expected completion, got {other:?}"),
    }

    // A second pass sees the moved file as already present.
    let again = fixture
        .orchestrator(vec![remote("tile_a.laz", 3)], enabled("tile"), true)
        .run(&NoopProgress)
        .await
        .unwrap();
    assert_eq!(again.skipped(), 1);
    assert_eq!(fixture.server.open_count(), 1);
}

/// Requests shutdown when the first transfer finishes.
struct CancelOnFinish(CancellationCoordinator, AtomicUsize);

impl ProgressSink for CancelOnFinish {
    fn on_event(&self, event: &ProgressEvent) {
        if let ProgressEvent::Finished { .. } = event {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0.request();
        }
    }
}

#[tokio::test]
async fn test_shutdown_stops_before_next_file() {
    let fixture = Fixture::new(&[
        ("tile_a.laz", "aaaa"),
        ("tile_b.laz", "bbbb"),
        ("tile_c.laz", "cccc"),
    ]);
    let listing = vec![
        remote("tile_a.laz", 4),
        remote("tile_b.laz", 4),
        remote("tile_c.laz", 4),
    ];
    let orchestrator = fixture.orchestrator(listing, enabled("tile"), false);
    let sink = CancelOnFinish(fixture.cancel.clone(), AtomicUsize::new(0));

    let summary = orchestrator.run(&sink).await.unwrap();

    assert_eq!(sink.1.load(Ordering::SeqCst), 1);
    assert_eq!(summary.completed(), 1);
    assert!(summary.interrupted);
    assert_eq!(summary.not_started, vec!["tile_b.laz", "tile_c.laz"]);
    assert_eq!(fixture.server.open_count(), 1);
}

#[tokio::test]
async fn test_nothing_to_download_creates_no_directories() {
    let fixture = Fixture::new(&[]);
    let missing = fixture.downloads.path().join("not-yet");
    let downloader = FileDownloader::new(
        fixture.server.clone(),
        RetryPolicy::new(1, Duration::ZERO),
        4,
        fixture.cancel.clone(),
    );
    let orchestrator = SyncOrchestrator::new(
        Arc::new(StaticListing(vec![remote("tile_a.laz", 1)])),
        Arc::new(RegexFilter::from_config(&enabled("^nomatch$")).unwrap()),
        None,
        downloader,
        SyncDirs {
            local_dir: fixture.local.path().to_path_buf(),
            download_dir: missing.clone(),
            move_completed: false,
        },
        fixture.cancel.clone(),
    );

    let summary = orchestrator.run(&NoopProgress).await.unwrap();

    assert_eq!(summary.filtered_out, vec!["tile_a.laz"]);
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_complete_download_left_behind_is_moved_when_moving_is_enabled() {
    let fixture = Fixture::new(&[("tile_a.laz", "abc")]);
    std::fs::write(fixture.downloads.path().join("tile_a.laz"), b"abc").unwrap();
    let orchestrator = fixture.orchestrator(vec![remote("tile_a.laz", 3)], enabled("tile"), true);

    let summary = orchestrator.run(&NoopProgress).await.unwrap();

    assert!(matches!(
        summary.files[0].outcome,
        FileOutcome::Skipped {
            reason: SkipReason::AlreadyDownloaded
        }
    ));
    assert_eq!(fixture.server.open_count(), 0);
    assert_eq!(std::fs::read(fixture.local.path().join("tile_a.laz")).unwrap(), b"abc");
    assert!(!fixture.downloads.path().join("tile_a.laz").exists());
}

#[tokio::test]
async fn test_listed_names_that_leave_the_download_directory_are_ignored() {
    let fixture = Fixture::new(&[("../escaped.laz", "abcde"), ("tile_a.laz", "abc")]);
    let listing = vec![
        RemoteFile::new("../escaped.laz", url("../escaped.laz"), Some(5)),
        RemoteFile::new("/tmp/absolute.laz", url("absolute.laz"), Some(5)),
        remote("tile_a.laz", 3),
    ];
    let orchestrator = fixture.orchestrator(listing, enabled("laz"), false);

    let summary = orchestrator.run(&NoopProgress).await.unwrap();

    let names: Vec<&str> = summary.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["tile_a.laz"]);
    assert_eq!(
        fixture.server.opens.lock().unwrap().as_slice(),
        &[(url("tile_a.laz"), 0)]
    );
    let parent = fixture.downloads.path().parent().unwrap();
    assert!(!parent.join("escaped.laz").exists());
}
