//! Progress reporting for in-flight runs.
//!
//! [`ProgressReporter`] is the abstract start/update/pause/resume/succeed/fail
//! surface a UI implements. Each run gets its own reporter from a
//! [`ReporterFactory`], wrapped in a [`Progress`] handle that guarantees the
//! terminal signal (succeed or fail) reaches the reporter exactly once.

use crate::config::SpinnerConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Status-signaling capability decoupled from any concrete UI.
pub trait ProgressReporter: Send + Sync {
    fn start(&self, message: &str);
    fn update(&self, message: &str);
    fn pause(&self);
    fn resume(&self);
    fn succeed(&self, message: &str);
    fn fail(&self, message: &str);
}

/// Creates one reporter per run.
pub trait ReporterFactory: Send + Sync {
    fn create(&self) -> Box<dyn ProgressReporter>;
}

/// A [`ReporterFactory`] backed by a closure.
pub struct FnReporterFactory<F>(pub F)
where
    F: Fn() -> Box<dyn ProgressReporter> + Send + Sync;

impl<F> ReporterFactory for FnReporterFactory<F>
where
    F: Fn() -> Box<dyn ProgressReporter> + Send + Sync,
{
    fn create(&self) -> Box<dyn ProgressReporter> {
        (self.0)()
    }
}

/// Discards every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _message: &str) {}
    fn update(&self, _message: &str) {}
    fn pause(&self) {}
    fn resume(&self) {}
    fn succeed(&self, _message: &str) {}
    fn fail(&self, _message: &str) {}
}

impl ReporterFactory for NoopReporter {
    fn create(&self) -> Box<dyn ProgressReporter> {
        Box::new(NoopReporter)
    }
}

/// Emits every signal as a `tracing` event. The default reporter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn start(&self, message: &str) {
        tracing::info!(%message, "run started");
    }

    fn update(&self, message: &str) {
        tracing::info!(%message, "run progress");
    }

    fn pause(&self) {
        tracing::debug!("progress paused");
    }

    fn resume(&self) {
        tracing::debug!("progress resumed");
    }

    fn succeed(&self, message: &str) {
        tracing::info!(%message, "run succeeded");
    }

    fn fail(&self, message: &str) {
        tracing::warn!(%message, "run failed");
    }
}

impl ReporterFactory for TracingReporter {
    fn create(&self) -> Box<dyn ProgressReporter> {
        Box::new(TracingReporter)
    }
}

/// Terminal spinner backed by `indicatif`.
#[cfg(feature = "spinner")]
pub struct SpinnerReporter {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "spinner")]
impl SpinnerReporter {
    pub fn new() -> Self {
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_style(indicatif::ProgressStyle::default_spinner());
        Self { bar }
    }
}

#[cfg(feature = "spinner")]
impl Default for SpinnerReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "spinner")]
impl ProgressReporter for SpinnerReporter {
    fn start(&self, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar
            .enable_steady_tick(std::time::Duration::from_millis(80));
    }

    fn update(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn pause(&self) {
        self.bar.disable_steady_tick();
    }

    fn resume(&self) {
        self.bar
            .enable_steady_tick(std::time::Duration::from_millis(80));
    }

    fn succeed(&self, message: &str) {
        self.bar.finish_with_message(format!("✔ {}", message));
    }

    fn fail(&self, message: &str) {
        self.bar.abandon_with_message(format!("✖ {}", message));
    }
}

#[cfg(feature = "spinner")]
impl ReporterFactory for SpinnerReporter {
    fn create(&self) -> Box<dyn ProgressReporter> {
        Box::new(SpinnerReporter::new())
    }
}

struct ProgressInner {
    reporter: Box<dyn ProgressReporter>,
    messages: SpinnerConfig,
    finished: AtomicBool,
}

/// Per-run progress handle.
///
/// Cheap to clone; all clones drive the same reporter. The first
/// `succeed`/`fail` wins, later terminal signals are dropped.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<ProgressInner>,
}

impl Progress {
    pub fn new(reporter: Box<dyn ProgressReporter>, messages: SpinnerConfig) -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                reporter,
                messages,
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// A handle that reports through `tracing` with default messages.
    pub fn tracing() -> Self {
        Self::new(Box::new(TracingReporter), SpinnerConfig::default())
    }

    pub fn messages(&self) -> &SpinnerConfig {
        &self.inner.messages
    }

    /// Put the reporter in the running state with the loading message.
    pub fn start(&self) {
        self.inner.reporter.start(&self.inner.messages.loading_message);
    }

    pub fn update(&self, message: &str) {
        if !self.is_finished() {
            self.inner.reporter.update(message);
        }
    }

    pub fn pause(&self) {
        self.inner.reporter.pause();
    }

    pub fn resume(&self) {
        self.inner.reporter.resume();
    }

    /// Signal success. Returns `false` if the run had already finished.
    pub fn succeed(&self, message: &str) -> bool {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.reporter.succeed(message);
        true
    }

    /// Signal failure. Returns `false` if the run had already finished.
    pub fn fail(&self, message: &str) -> bool {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.reporter.fail(message);
        true
    }

    pub fn succeed_default(&self) -> bool {
        self.succeed(&self.inner.messages.success_message)
    }

    pub fn fail_default(&self) -> bool {
        self.fail(&self.inner.messages.error_message)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("messages", &self.inner.messages)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl ProgressReporter for Recorder {
        fn start(&self, m: &str) {
            self.0.lock().push(format!("start:{}", m));
        }
        fn update(&self, m: &str) {
            self.0.lock().push(format!("update:{}", m));
        }
        fn pause(&self) {
            self.0.lock().push("pause".into());
        }
        fn resume(&self) {
            self.0.lock().push("resume".into());
        }
        fn succeed(&self, m: &str) {
            self.0.lock().push(format!("succeed:{}", m));
        }
        fn fail(&self, m: &str) {
            self.0.lock().push(format!("fail:{}", m));
        }
    }

    #[test]
    fn test_terminal_signal_once() {
        let rec = Recorder::default();
        let progress = Progress::new(Box::new(rec.clone()), SpinnerConfig::default());
        progress.start();
        assert!(progress.succeed("done"));
        assert!(!progress.fail("late"));
        assert!(!progress.clone().succeed_default());
        progress.update("ignored");

        assert_eq!(
            *rec.0.lock(),
            vec!["start:Processing request...", "succeed:done"]
        );
    }

    #[test]
    fn test_default_messages() {
        let rec = Recorder::default();
        let progress = Progress::new(Box::new(rec.clone()), SpinnerConfig::default());
        progress.pause();
        progress.resume();
        progress.fail_default();
        assert_eq!(
            *rec.0.lock(),
            vec!["pause", "resume", "fail:An error occurred during the process"]
        );
        assert!(progress.is_finished());
    }

    #[test]
    fn test_fn_factory() {
        let rec = Recorder::default();
        let shared = rec.clone();
        let factory = FnReporterFactory(move || Box::new(shared.clone()) as Box<dyn ProgressReporter>);
        factory.create().start("x");
        assert_eq!(*rec.0.lock(), vec!["start:x"]);
    }
}
