pub mod api;
pub mod console;
pub mod error;
pub mod utils;

use anyhow::{anyhow, Result};
use lumi_config::LumiConfig;
use lumi_inference_engine::{GenerationParams, GenerationResult, TextGenerator};
use lumi_models::create_model;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use error::GenerationError;

#[allow(unused_imports)]
use tracing::{info, debug, error, warn};

/// The one loaded model of the process.
///
/// Created once at startup and shared by reference with both front ends.
/// Every generation goes through the same lock, so at most one runs at a
/// time no matter which front end or thread it came from. Device name and
/// parameter count are captured at load and read without locking.
#[derive(Debug)]
pub struct Lumi {
    model: Arc<Mutex<Box<dyn TextGenerator>>>,
    device: String,
    parameter_count: usize,
}

impl Lumi {
    pub fn new(config: &LumiConfig) -> Result<Self> {
        info!("Loading {} model from {}", config.model_family, config.model_path);
        let model = create_model(config)?;
        Ok(Self::from_generator(model))
    }

    pub fn from_generator(model: Box<dyn TextGenerator>) -> Self {
        let device = model.device_name();
        let parameter_count = model.parameter_count();

        Lumi {
            model: Arc::new(Mutex::new(model)),
            device,
            parameter_count,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Generate from an async context.
    ///
    /// Waits for any in-flight generation, then runs this one on the blocking
    /// pool. Dropping the returned future while it runs does not interrupt
    /// the generation; the lock is released when it finishes.
    pub async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GenerationResult, GenerationError> {
        let model = Arc::clone(&self.model).lock_owned().await;
        let prompt = prompt.to_owned();
        let params = params.clone();

        match tokio::task::spawn_blocking(move || model.complete(&prompt, &params)).await {
            Ok(result) => Ok(result?),
            Err(e) if e.is_panic() => Err(GenerationError::from_panic(e.into_panic())),
            Err(e) => Err(anyhow!("Task failed: {}", e).into()),
        }
    }

    /// Generate from a thread outside the async runtime, e.g. the console.
    ///
    /// Panics if called from within an async execution context. A panic
    /// inside the model is returned as [`GenerationError::Failed`].
    pub fn generate_blocking(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GenerationResult, GenerationError> {
        let model = self.model.blocking_lock();
        match panic::catch_unwind(AssertUnwindSafe(|| model.complete(prompt, params))) {
            Ok(result) => Ok(result?),
            Err(payload) => Err(GenerationError::from_panic(payload)),
        }
    }
}
