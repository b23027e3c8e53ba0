use std::any::Any;

use thiserror::Error;

/// Failure of a single generation call. The engine stays usable afterwards.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

impl GenerationError {
    /// Turn the payload of a panicked generation into a regular failure.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        GenerationError::Failed(anyhow::anyhow!("Generation panicked: {}", message))
    }
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        GenerationError::Failed(err)
    }
}
