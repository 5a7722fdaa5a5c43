//! Test configuration helpers for creating pipelines over a temp directory

use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use textbook_dl::{Config, Pipeline, RetryConfig};

/// A pipeline whose input and output live inside a temp directory
pub struct TestPipeline {
    /// The pipeline under test
    pub pipeline: Pipeline,
    /// Catalogue path inside `_temp_dir`
    pub input_path: PathBuf,
    /// Output directory inside `_temp_dir`
    pub output_dir: PathBuf,
    /// Keeps the directory alive for the duration of the test
    pub _temp_dir: TempDir,
}

/// Retry policy with short delays so retried tests stay fast
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Config pointing at `temp_dir` with `workers` workers and fast retries
pub fn test_config(temp_dir: &TempDir, workers: usize) -> Config {
    let mut config = Config {
        input_path: temp_dir.path().join("catalogue.csv"),
        output_dir: temp_dir.path().join("output"),
        workers,
        ..Default::default()
    };
    config.http.read_timeout = Duration::from_secs(5);
    config.retry.landing_page = fast_retry(2);
    config.retry.transfer = fast_retry(2);
    config.retry.open_input = RetryConfig::no_retry();
    config
}

/// Build a pipeline over a fresh temp directory, letting the caller adjust the config
pub fn create_test_pipeline(workers: usize, adjust: impl FnOnce(&mut Config)) -> TestPipeline {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(&temp_dir, workers);
    adjust(&mut config);

    let input_path = config.input_path.clone();
    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(config).expect("Failed to create pipeline");

    TestPipeline {
        pipeline,
        input_path,
        output_dir,
        _temp_dir: temp_dir,
    }
}
