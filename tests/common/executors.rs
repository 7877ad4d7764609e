//! Mock per-image executors with concurrency instrumentation.

use async_trait::async_trait;
use imagebatch_core::orchestration::{ExecutionContext, ExecutorError, ImageOperationExecutor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// What the executor does for one image
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    Fail(String),
    Panic,
    /// Wait for cancellation, ignoring everything else
    Hang,
    /// Block until the test calls `release`, or cancellation
    Gate,
}

/// Executor driven by a per-image script
#[derive(Debug)]
pub struct ScriptedExecutor {
    default: Script,
    scripts: HashMap<String, Script>,
    delay: Duration,
    gate: Semaphore,
    running: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    started_notify: Notify,
    invocations: Mutex<Vec<String>>,
    progress_steps: Vec<f64>,
}

impl ScriptedExecutor {
    pub fn new(default: Script) -> Self {
        Self {
            default,
            scripts: HashMap::new(),
            delay: Duration::ZERO,
            gate: Semaphore::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            started_notify: Notify::new(),
            invocations: Mutex::new(Vec::new()),
            progress_steps: Vec::new(),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Script::Succeed)
    }

    pub fn gated() -> Self {
        Self::new(Script::Gate)
    }

    pub fn with_script(mut self, image_path: &str, script: Script) -> Self {
        self.scripts.insert(image_path.to_string(), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_progress_steps(mut self, steps: &[f64]) -> Self {
        self.progress_steps = steps.to_vec();
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Let `count` gated invocations finish
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    /// Wait until at least `count` invocations have begun
    pub async fn wait_for_started(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.started_notify.notified();
                if self.started() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or_else(|_| panic!("only {} of {count} invocations started", self.started()));
    }

    async fn run_script(&self, script: Script, context: &ExecutionContext) -> Result<(), ExecutorError> {
        match script {
            Script::Succeed => Ok(()),
            Script::Fail(message) => Err(ExecutorError::failed(message)),
            Script::Panic => panic!("scripted panic for {}", context.image_path),
            Script::Hang => {
                context.cancellation.cancelled().await;
                Err(ExecutorError::Cancelled)
            }
            Script::Gate => {
                tokio::select! {
                    permit = self.gate.acquire() => {
                        permit.map_err(|e| ExecutorError::failed(e.to_string()))?.forget();
                        Ok(())
                    }
                    _ = context.cancellation.cancelled() => Err(ExecutorError::Cancelled),
                }
            }
        }
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageOperationExecutor for ScriptedExecutor {
    async fn execute(&self, context: ExecutionContext) -> Result<(), ExecutorError> {
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = RunningGuard(&self.running);
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        self.invocations.lock().push(context.image_path.clone());
        self.started.fetch_add(1, Ordering::SeqCst);
        self.started_notify.notify_waiters();

        for step in &self.progress_steps {
            context.progress.report(*step).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let script = self
            .scripts
            .get(&context.image_path)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        self.run_script(script, &context).await
    }
}
