use super::*;
use crate::config::{RetryConfig, UnresolvedPolicy};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(output: &TempDir, workers: usize) -> Config {
    let mut config = Config {
        output_dir: output.path().join("output"),
        workers,
        ..Default::default()
    };
    config.http.read_timeout = Duration::from_secs(5);
    config.retry.landing_page = RetryConfig::no_retry();
    config.retry.transfer = RetryConfig::no_retry();
    config.retry.open_input = RetryConfig::no_retry();
    config
}

fn record(title: &str, content_id: &str, landing_page_url: String) -> Record {
    Record {
        title: title.to_string(),
        author: "Author".to_string(),
        content_id: content_id.to_string(),
        doi_url: format!("http://doi.org/{}", content_id),
        landing_page_url,
    }
}

fn landing_page(link: &str) -> String {
    format!(
        "<html>\n<body>\n<a href=\"{}\" title=\"Download this book in PDF format\">PDF</a>\n</body>\n</html>\n",
        link
    )
}

async fn mount_book(server: &MockServer, id: &str, content: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/book/{}", id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(landing_page(&format!("/content/{}.pdf", id))),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/content/{}.pdf", id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content))
        .mount(server)
        .await;
}

async fn mount_bare_page(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/book/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>\nno links\n</html>\n"))
        .mount(server)
        .await;
}

fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn resolved_records_are_written_and_unresolved_are_reported() {
    let server = MockServer::start().await;
    mount_book(&server, "1", b"first book").await;
    mount_bare_page(&server, "2").await;

    let temp = tempfile::tempdir().unwrap();
    let config = test_config(&temp, 2);
    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(config).unwrap();
    let mut events = pipeline.subscribe();

    let summary = pipeline
        .run_records(vec![
            Ok(record("Algebra", "978-1", format!("{}/book/1", server.uri()))),
            Ok(record("Botany", "978-2", format!("{}/book/2", server.uri()))),
        ])
        .await
        .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.bytes, 10);

    let written = std::fs::read(output_dir.join("Algebra (978-1).pdf")).unwrap();
    assert_eq!(written, b"first book");
    assert!(!output_dir.join("Botany (978-2).pdf").exists());

    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Unresolved { title, format: crate::types::Format::Pdf, .. } if title == "Botany"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::DownloadComplete { bytes: 10, .. }
    )));
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[tokio::test]
async fn download_started_precedes_download_complete() {
    let server = MockServer::start().await;
    mount_book(&server, "1", b"content").await;

    let temp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&temp, 1)).unwrap();
    let mut events = pipeline.subscribe();

    pipeline
        .run_records(vec![Ok(record(
            "Algebra",
            "978-1",
            format!("{}/book/1", server.uri()),
        ))])
        .await
        .unwrap();

    let events = drain_events(&mut events);
    assert_eq!(events.len(), 2);
    match (&events[0], &events[1]) {
        (
            Event::DownloadStarted { path: started, .. },
            Event::DownloadComplete { path: completed, .. },
        ) => assert_eq!(started, completed),
        other => panic!("unexpected event order: {other:?}"),
    }
}

#[tokio::test]
async fn empty_source_finishes_immediately() {
    let temp = tempfile::tempdir().unwrap();
    let config = test_config(&temp, 4);
    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(config).unwrap();

    let summary = pipeline.run_records(Vec::new()).await.unwrap();

    assert_eq!(summary, RunSummary::default());
    assert!(output_dir.is_dir(), "output directory is created at startup");
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[tokio::test]
async fn pipeline_can_only_run_once() {
    let temp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&temp, 1)).unwrap();

    pipeline.run_records(Vec::new()).await.unwrap();
    let second = pipeline.run_records(Vec::new()).await;

    assert!(matches!(second, Err(Error::AlreadyStarted)));
}

#[tokio::test]
async fn source_error_stops_production_but_finishes_earlier_records() {
    let server = MockServer::start().await;
    mount_book(&server, "1", b"first").await;
    mount_book(&server, "3", b"third").await;

    let temp = tempfile::tempdir().unwrap();
    let config = test_config(&temp, 2);
    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(config).unwrap();

    let result = pipeline
        .run_records(vec![
            Ok(record("First", "1", format!("{}/book/1", server.uri()))),
            Err(Error::InvalidRecord {
                row: 2,
                expected: 22,
                found: 3,
            }),
            Ok(record("Third", "3", format!("{}/book/3", server.uri()))),
        ])
        .await;

    match result {
        Err(Error::InvalidRecord { row, found, .. }) => {
            assert_eq!(row, 2);
            assert_eq!(found, 3);
        }
        other => panic!("expected InvalidRecord, got {other:?}"),
    }
    assert!(output_dir.join("First (1).pdf").exists());
    assert!(!output_dir.join("Third (3).pdf").exists());
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[tokio::test]
async fn landing_page_failure_is_reported_and_run_continues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_book(&server, "2", b"ok").await;

    let temp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&temp, 1)).unwrap();
    let mut events = pipeline.subscribe();

    let summary = pipeline
        .run_records(vec![
            Ok(record("Missing", "1", format!("{}/book/missing", server.uri()))),
            Ok(record("Present", "2", format!("{}/book/2", server.uri()))),
        ])
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.downloaded, 1);
    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ResolveFailed { title, error } if title == "Missing" && error.contains("404")
    )));
}

#[tokio::test]
async fn failed_transfer_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page("/content/1.pdf")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/content/1.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let config = test_config(&temp, 1);
    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(config).unwrap();
    let mut events = pipeline.subscribe();

    let summary = pipeline
        .run_records(vec![Ok(record(
            "Broken",
            "1",
            format!("{}/book/1", server.uri()),
        ))])
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert!(!output_dir.join("Broken (1).pdf").exists());
    assert!(
        drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, Event::DownloadFailed { .. }))
    );
}

#[tokio::test]
async fn abort_policy_stops_the_run_on_unresolved_record() {
    let server = MockServer::start().await;
    mount_bare_page(&server, "1").await;

    let temp = tempfile::tempdir().unwrap();
    let mut config = test_config(&temp, 1);
    config.on_unresolved = UnresolvedPolicy::Abort;
    let pipeline = Pipeline::new(config).unwrap();

    let records: Vec<Result<Record>> = (0..20)
        .map(|i| Ok(record(&format!("Book {}", i), "1", format!("{}/book/1", server.uri()))))
        .collect();
    let result = pipeline.run_records(records).await;

    match result {
        Err(Error::Unresolved { title, format, .. }) => {
            assert_eq!(title, "Book 0");
            assert_eq!(format, "PDF");
        }
        other => panic!("expected Unresolved, got {other:?}"),
    }
    assert!(pipeline.cancellation_token().is_cancelled());
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[tokio::test]
async fn cancel_stops_in_flight_work() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(landing_page("/content/slow.pdf"))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&temp, 2)).unwrap();
    let token = pipeline.cancellation_token();
    let mut state = pipeline.subscribe_state();

    let records: Vec<Result<Record>> = (0..5)
        .map(|i| Ok(record(&format!("Slow {}", i), "s", format!("{}/book/slow", server.uri()))))
        .collect();

    let runner = pipeline.clone();
    let handle = tokio::spawn(async move { runner.run_records(records).await });

    state
        .wait_for(|s| *s == PipelineState::Running)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run should stop promptly after cancel")
        .unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[tokio::test]
async fn workers_bound_concurrency() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/delayed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>\nnothing\n</html>\n")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(&temp, 2)).unwrap();

    let records: Vec<Result<Record>> = (0..8)
        .map(|i| Ok(record(&format!("Book {}", i), "x", format!("{}/book/delayed", server.uri()))))
        .collect();

    let started = Instant::now();
    let summary = pipeline.run_records(records).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.unresolved, 8);
    // 8 records over 2 workers at 200ms each is 4 rounds; one worker would need 8
    assert!(elapsed >= Duration::from_millis(800), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let config = test_config(&temp, 0);

    let result = Pipeline::new(config);

    assert!(matches!(result, Err(Error::Config { .. })));
}
