//! Shared helpers for integration tests.

#![allow(dead_code)]

use multillama::{ProgressReporter, ReporterFactory};
use parking_lot::Mutex;
use std::sync::Arc;

/// Reporter that records every signal it receives, shared by all the
/// reporters it creates.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn terminal_events(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with("succeed:") || e.starts_with("fail:"))
            .collect()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl ProgressReporter for RecordingReporter {
    fn start(&self, message: &str) {
        self.push(format!("start:{}", message));
    }
    fn update(&self, message: &str) {
        self.push(format!("update:{}", message));
    }
    fn pause(&self) {
        self.push("pause".to_string());
    }
    fn resume(&self) {
        self.push("resume".to_string());
    }
    fn succeed(&self, message: &str) {
        self.push(format!("succeed:{}", message));
    }
    fn fail(&self, message: &str) {
        self.push(format!("fail:{}", message));
    }
}

impl ReporterFactory for RecordingReporter {
    fn create(&self) -> Box<dyn ProgressReporter> {
        Box::new(self.clone())
    }
}

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
