use crate::utils::{
    count_parameters, device, device_label, load_safetensor_model_files, parse_dtype, read_json_file,
    resolve_tokenizer_file,
};
use anyhow::{anyhow, bail, Context, Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama;
use llama::{LlamaConfig, LlamaEosToks};
use lumi_config::LumiConfig;
use lumi_inference_engine::{
    DecodingConfig, EosTokenHandler, InferenceEngine, ModelInference, SpecialTokens, TextGenerator,
};
use serde::Deserialize;
use std::path::Path;
use tokenizers::Tokenizer;

#[allow(unused_imports)]
use tracing::{info, debug, error, warn};

/// Added-token entries in `tokenizer_config.json` are either a bare string or
/// an object carrying the token text.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
enum TokenName {
    Plain(String),
    Added { content: String },
}

impl TokenName {
    fn as_str(&self) -> &str {
        match self {
            TokenName::Plain(s) => s,
            TokenName::Added { content } => content,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    eos_token: Option<TokenName>,
    #[serde(default)]
    pad_token: Option<TokenName>,
}

/// Pick eos then pad ids. Pad falls back to eos so it is always defined.
fn resolve_special_tokens(
    model_eos: &EosTokenHandler,
    tokenizer: &Tokenizer,
    tokenizer_config: &TokenizerConfig,
) -> Result<SpecialTokens> {
    let lookup = |name: &Option<TokenName>| {
        name.as_ref().and_then(|name| tokenizer.token_to_id(name.as_str()))
    };

    let eos_token_id = model_eos
        .primary()
        .or_else(|| lookup(&tokenizer_config.eos_token))
        .ok_or_else(|| anyhow!("Neither the model nor the tokenizer defines an end-of-sequence token"))?;

    let pad_token_id = tokenizer
        .get_padding()
        .map(|padding| padding.pad_id)
        .or_else(|| lookup(&tokenizer_config.pad_token))
        .unwrap_or_else(|| {
            debug!("No padding token defined, using eos token {}", eos_token_id);
            eos_token_id
        });

    Ok(SpecialTokens { pad_token_id, eos_token_id })
}

#[derive(Debug)]
pub struct LlamaModel {
    model: llama::Llama,
    config: llama::Config,
    tokenizer: Tokenizer,
    special_tokens: SpecialTokens,
    device: Device,
    dtype: DType,
    eos_handler: EosTokenHandler,
    parameter_count: usize,
    seed: u64,
    enable_kv_cache: bool,
}

impl LlamaModel {
    pub fn new(config: &LumiConfig) -> Result<Self> {
        let device = device()?;
        info!("Using device: {:?}", device);
        let dtype = parse_dtype(&config.dtype)?;
        info!("Using dtype: {:?}", dtype);

        let model_dir = Path::new(&config.model_path);

        if !model_dir.exists() {
            bail!("Model directory does not exist: {}", model_dir.display());
        } else if !model_dir.is_dir() {
            bail!("Model path is not a directory: {}", model_dir.display());
        }

        let safetensors_files = load_safetensor_model_files(model_dir)
            .with_context(|| format!("Failed to load safetensors files at {}", model_dir.display()))?;

        let llama_config: LlamaConfig = read_json_file(&model_dir.join("config.json"))?;

        // Disable flash attention on Metal since it's CUDA-only
        let use_flash_attn = match device {
            Device::Metal(_) => {
                if config.use_flash_attn {
                    warn!("Flash attention is not supported on Metal, disabling");
                }
                false
            },
            Device::Cuda(_) => config.use_flash_attn,
            _ => false,
        };

        let llama_config = llama_config.into_config(use_flash_attn);

        let eos_handler: EosTokenHandler = match &llama_config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => EosTokenHandler::Single(*id),
            Some(LlamaEosToks::Multiple(ids)) => EosTokenHandler::Multiple(ids.clone()),
            None => EosTokenHandler::None,
        };

        let parameter_count = count_parameters(&safetensors_files)?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&safetensors_files, dtype, &device)? };
        let model = llama::Llama::load(vb, &llama_config)?;

        let tokenizer_file = resolve_tokenizer_file(model_dir, config.tokenizer_path.as_deref())?;
        let tokenizer = Tokenizer::from_file(&tokenizer_file).map_err(E::msg)?;

        let tokenizer_config_path = tokenizer_file.with_file_name("tokenizer_config.json");
        let tokenizer_config: TokenizerConfig = if tokenizer_config_path.is_file() {
            read_json_file(&tokenizer_config_path)?
        } else {
            TokenizerConfig::default()
        };

        let special_tokens = resolve_special_tokens(&eos_handler, &tokenizer, &tokenizer_config)?;
        info!(
            "Model loaded: {} parameters, pad token {}, eos token {}",
            parameter_count, special_tokens.pad_token_id, special_tokens.eos_token_id
        );

        Ok(LlamaModel {
            model,
            config: llama_config,
            tokenizer,
            special_tokens,
            device,
            dtype,
            eos_handler,
            parameter_count,
            seed: config.seed,
            enable_kv_cache: config.enable_kv_cache,
        })
    }
}

impl ModelInference for LlamaModel {
    type Cache = llama::Cache;

    fn create_cache(&self, enable_kv_cache: bool, dtype: DType, device: &Device) -> Result<Self::Cache> {
        llama::Cache::new(enable_kv_cache, dtype, &self.config, device).map_err(E::from)
    }

    fn forward(&self, input: &Tensor, context_index: usize, cache: &mut Self::Cache) -> Result<Tensor> {
        self.model.forward(input, context_index, cache).map_err(E::from)
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn use_kv_cache(&self) -> bool {
        self.enable_kv_cache
    }

    fn eos_handler(&self) -> &EosTokenHandler {
        &self.eos_handler
    }
}

impl TextGenerator for LlamaModel {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, E> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();

        Ok(tokens)
    }

    fn generate_tokens(&self, tokens: Vec<u32>, config: &DecodingConfig) -> Result<Vec<u32>, E> {
        InferenceEngine::generate(self, tokens, config)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, E> {
        self.tokenizer.decode(tokens, true).map_err(E::msg)
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.special_tokens
    }

    fn device_name(&self) -> String {
        device_label(&self.device)
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"<unk>": 0, "</s>": 1, "<pad>": 2, "hello": 3},
            "unk_token": "<unk>"
        }
    }"#;

    fn word_level_tokenizer() -> Tokenizer {
        Tokenizer::from_str(WORD_LEVEL_TOKENIZER).unwrap()
    }

    #[test]
    fn test_token_name_accepts_both_shapes() {
        let config: TokenizerConfig = serde_json::from_str(
            r#"{"eos_token": "</s>", "pad_token": {"content": "<pad>", "lstrip": false}}"#,
        )
        .unwrap();

        assert_eq!(config.eos_token.unwrap().as_str(), "</s>");
        assert_eq!(config.pad_token.unwrap().as_str(), "<pad>");
    }

    #[test]
    fn test_pad_defaults_to_eos() {
        let tokenizer = word_level_tokenizer();
        let special = resolve_special_tokens(
            &EosTokenHandler::Single(1),
            &tokenizer,
            &TokenizerConfig::default(),
        )
        .unwrap();

        assert_eq!(special, SpecialTokens { pad_token_id: 1, eos_token_id: 1 });
    }

    #[test]
    fn test_pad_and_eos_from_tokenizer_config() {
        let tokenizer = word_level_tokenizer();
        let tokenizer_config = TokenizerConfig {
            eos_token: Some(TokenName::Plain("</s>".to_string())),
            pad_token: Some(TokenName::Plain("<pad>".to_string())),
        };
        let special = resolve_special_tokens(&EosTokenHandler::None, &tokenizer, &tokenizer_config).unwrap();

        assert_eq!(special, SpecialTokens { pad_token_id: 2, eos_token_id: 1 });
    }

    #[test]
    fn test_missing_eos_fails_to_load() {
        let tokenizer = word_level_tokenizer();
        assert!(resolve_special_tokens(&EosTokenHandler::None, &tokenizer, &TokenizerConfig::default()).is_err());
    }
}
