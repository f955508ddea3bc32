use std::sync::{Arc, Mutex as StdMutex};

use log::{info, warn};

use super::orchestrator::AudioProcessor;
use super::{AudioFile, ProcessingOptions, ProcessingResult};

/// Snapshot of a running or finished batch. `results`, `errors` and
/// `current_index` stay index-aligned with the input sequence: a failed item
/// holds `None` and its error message, a successful one holds the result and
/// an empty string.
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    pub is_processing: bool,
    pub current_index: usize,
    pub total_files: usize,
    pub results: Vec<Option<ProcessingResult>>,
    pub errors: Vec<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<Option<ProcessingResult>>,
    pub errors: Vec<String>,
}

/// Drives the processor across a sequence of files, strictly one at a time
/// (the engine is a single shared resource), isolating per-item failures so
/// one bad file never aborts the rest of the batch.
pub struct BatchProcessor {
    processor: Arc<AudioProcessor>,
    state: Arc<StdMutex<BatchState>>,
}

impl BatchProcessor {
    pub fn new(processor: Arc<AudioProcessor>) -> Self {
        Self {
            processor,
            state: Arc::new(StdMutex::new(BatchState::default())),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state.lock().unwrap().clone()
    }

    pub async fn process_batch(
        &self,
        files: &[AudioFile],
        options: &ProcessingOptions,
    ) -> BatchOutcome {
        {
            let mut state = self.state.lock().unwrap();
            *state = BatchState {
                is_processing: true,
                total_files: files.len(),
                started_at: Some(chrono::Utc::now()),
                ..Default::default()
            };
        }

        let mut results: Vec<Option<ProcessingResult>> = Vec::with_capacity(files.len());
        let mut errors: Vec<String> = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            info!("Batch item {}/{}: {}", index + 1, files.len(), file.name);
            match self.processor.process_audio(file, options).await {
                Ok(result) => {
                    results.push(Some(result));
                    errors.push(String::new());
                }
                Err(err) => {
                    warn!("Batch item {} failed: {}", file.name, err);
                    results.push(None);
                    errors.push(err.to_string());
                }
            }

            let mut state = self.state.lock().unwrap();
            state.results.push(results[index].clone());
            state.errors.push(errors[index].clone());
            state.current_index = index + 1;
        }

        {
            let mut state = self.state.lock().unwrap();
            state.is_processing = false;
            state.completed_at = Some(chrono::Utc::now());
        }

        let succeeded = results.iter().filter(|r| r.is_some()).count();
        info!(
            "Batch finished: {}/{} items succeeded",
            succeeded,
            files.len()
        );
        BatchOutcome { results, errors }
    }
}
