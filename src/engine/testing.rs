//! Instrumented in-memory engine used by orchestrator and batch tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{CodecEngine, EngineProgress, EngineState, ProgressHandler};
use crate::errors::{AppError, Result};

pub struct StubEngine {
    state: Mutex<EngineState>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    handler: Mutex<Option<ProgressHandler>>,
    ops: Mutex<Vec<String>>,
    exec_delay: Duration,
    ticks: Vec<f32>,
    fail_init: bool,
    fail_exec_on: Option<usize>,
    exec_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::Uninitialized),
            files: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            ops: Mutex::new(Vec::new()),
            exec_delay: Duration::ZERO,
            ticks: Vec::new(),
            fail_init: false,
            fail_exec_on: None,
            exec_count: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    /// Progress ratios reported during each exec, in order.
    pub fn with_ticks(mut self, ticks: Vec<f32>) -> Self {
        self.ticks = ticks;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Makes the nth exec (1-based) fail.
    pub fn fail_on_exec(mut self, nth: usize) -> Self {
        self.fail_exec_on = Some(nth);
        self
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }

    async fn run_exec(&self, args: &[String]) -> Result<()> {
        if !self.exec_delay.is_zero() {
            tokio::time::sleep(self.exec_delay).await;
        }
        for tick in &self.ticks {
            if let Some(handler) = self.handler.lock().unwrap().as_ref() {
                handler(EngineProgress {
                    ratio: *tick,
                    time_secs: Some(f64::from(*tick) * 60.0),
                });
            }
        }
        let nth = self.exec_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_exec_on == Some(nth) {
            return Err(AppError::Execution(format!(
                "synthetic codec failure on exec #{}",
                nth
            )));
        }
        if let Some(output) = args.last() {
            self.files
                .lock()
                .unwrap()
                .insert(output.clone(), b"stub-encoded-output".to_vec());
        }
        Ok(())
    }
}

#[async_trait]
impl CodecEngine for StubEngine {
    async fn initialize(&self) -> Result<()> {
        self.record("initialize");
        if self.fail_init {
            *self.state.lock().unwrap() = EngineState::Failed;
            return Err(AppError::Initialization(
                "stub engine refused to load".to_string(),
            ));
        }
        *self.state.lock().unwrap() = EngineState::Ready;
        Ok(())
    }

    fn state(&self) -> EngineState {
        *self.state.lock().unwrap()
    }

    fn set_progress_handler(&self, handler: Option<ProgressHandler>) {
        *self.handler.lock().unwrap() = handler;
    }

    async fn write_input(&self, name: &str, data: &[u8]) -> Result<()> {
        self.record(format!("write:{}", name));
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        self.record(format!("exec:{}", args.join(" ")));
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let result = self.run_exec(args).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
        self.record(format!("read:{}", name));
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::EngineIo(format!("no such file: {}", name)))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.record(format!("delete:{}", name));
        self.files
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AppError::EngineIo(format!("no such file: {}", name)))
    }
}
