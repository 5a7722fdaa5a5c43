//! Custom assertions and event helpers for integration tests

use std::path::Path;
use std::time::Duration;
use textbook_dl::Event;
use tokio::sync::broadcast;

/// Collect the events already buffered in `events`
///
/// Call after the run finished to see everything it emitted.
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Wait up to `timeout` for an event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Assert a file exists with exactly `expected` as its content
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let actual = std::fs::read(path)
        .unwrap_or_else(|e| panic!("Expected file {} to exist: {}", path.display(), e));
    assert_eq!(
        actual.len(),
        expected.len(),
        "Size mismatch for {}",
        path.display()
    );
    assert!(actual == expected, "Content mismatch for {}", path.display());
}

/// Number of regular files in `dir`
pub fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .count()
        })
        .unwrap_or(0)
}
