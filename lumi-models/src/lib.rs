pub mod utils;

#[cfg(feature = "llama")]
pub mod llama;

#[cfg(feature = "llama")]
pub use llama::LlamaModel;

use anyhow::{bail, Error as E, Result};
use lumi_config::LumiConfig;
use lumi_inference_engine::TextGenerator;

/// Factory function to create models based on configuration
pub fn create_model(config: &LumiConfig) -> Result<Box<dyn TextGenerator>, E> {
    match config.model_family.as_str() {
        #[cfg(feature = "llama")]
        "llama" => Ok(Box::new(LlamaModel::new(config)?)),

        _ => bail!("Unsupported model family: {}", config.model_family),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_model_family() {
        let config = LumiConfig { model_family: "gpt2".to_string(), ..Default::default() };
        let err = create_model(&config).unwrap_err();
        assert!(err.to_string().contains("Unsupported model family: gpt2"));
    }

    #[test]
    fn test_missing_model_directory_fails_to_load() {
        let config = LumiConfig {
            model_path: "/nonexistent/lumi/model".to_string(),
            ..Default::default()
        };
        assert!(create_model(&config).is_err());
    }
}
