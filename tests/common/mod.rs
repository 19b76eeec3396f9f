//! Common test utilities for hiperfetch end-to-end tests

use hiperfetch::{Completion, CompletionSink, Config, SinkError};
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Configuration rooted in a fresh temporary directory
pub fn test_config() -> (Config, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.intake.fifo_path = temp_dir.path().join("jobs.fifo");
    config.intake.poll_interval = Duration::from_secs(1);
    config.persistence.database_path = temp_dir.path().join("pages.db");
    config.transfer.connect_timeout = Some(Duration::from_secs(5));
    config.transfer.timeout = Some(Duration::from_secs(10));

    (config, temp_dir)
}

/// Sink sharing its records with the test body
#[derive(Clone, Default)]
pub struct SharedSink(pub Rc<RefCell<Vec<Completion>>>);

#[allow(dead_code)]
impl SharedSink {
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn sorted_by_url(&self) -> Vec<Completion> {
        let mut records = self.0.borrow().clone();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }
}

impl CompletionSink for SharedSink {
    fn record(&mut self, completion: Completion) -> Result<(), SinkError> {
        self.0.borrow_mut().push(completion);
        Ok(())
    }
}

/// Wait for the daemon to create its pipe, then write `jobs` into it
pub async fn write_jobs(fifo: &Path, jobs: &str) {
    wait_until(Duration::from_secs(5), || fifo.exists()).await;
    let mut writer = OpenOptions::new().write(true).open(fifo).unwrap();
    writer.write_all(jobs.as_bytes()).unwrap();
}

/// Poll `condition` every 10ms, panicking after `limit`
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < limit, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
