use candle_transformers::generation::{LogitsProcessor, Sampling};
use serde::Deserialize;

use crate::template::TemplateKind;

#[allow(unused_imports)]
use tracing::{info, debug};

pub const DEFAULT_MAX_NEW_TOKENS: usize = 100;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_REPETITION_PENALTY: f32 = 1.1;
pub const DEFAULT_DO_SAMPLE: bool = true;

/// Fixed decoding behaviour, not exposed to callers.
pub const EARLY_STOPPING: bool = true;
pub const NO_REPEAT_NGRAM_SIZE: usize = 3;

/// Caller-supplied knobs, each one optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub do_sample: Option<bool>,
    #[serde(default)]
    pub template: Option<String>,
}

/// Effective generation parameters for one request.
///
/// Values are passed through as given; the decoding loop is the only place
/// that interprets them.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f32,
    pub do_sample: bool,
    pub template: TemplateKind,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams::from_options(GenerationOptions::default())
    }
}

impl GenerationParams {
    pub fn from_options(options: GenerationOptions) -> Self {
        GenerationParams {
            max_new_tokens: options.max_new_tokens.unwrap_or(DEFAULT_MAX_NEW_TOKENS),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: options.top_p.unwrap_or(DEFAULT_TOP_P),
            repetition_penalty: options
                .repetition_penalty
                .unwrap_or(DEFAULT_REPETITION_PENALTY),
            do_sample: options.do_sample.unwrap_or(DEFAULT_DO_SAMPLE),
            template: options
                .template
                .as_deref()
                .map(TemplateKind::from_name)
                .unwrap_or_default(),
        }
    }

    pub fn decoding_config(&self, special_tokens: SpecialTokens, seed: u64) -> DecodingConfig {
        DecodingConfig {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            repetition_penalty: self.repetition_penalty,
            do_sample: self.do_sample,
            pad_token_id: special_tokens.pad_token_id,
            eos_token_id: special_tokens.eos_token_id,
            early_stopping: EARLY_STOPPING,
            no_repeat_ngram_size: NO_REPEAT_NGRAM_SIZE,
            seed,
        }
    }
}

impl From<GenerationOptions> for GenerationParams {
    fn from(options: GenerationOptions) -> Self {
        GenerationParams::from_options(options)
    }
}

/// Token ids the tokenizer guarantees after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad_token_id: u32,
    pub eos_token_id: u32,
}

/// Everything the decoding loop needs for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodingConfig {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f32,
    pub do_sample: bool,
    pub pad_token_id: u32,
    pub eos_token_id: u32,
    pub early_stopping: bool,
    pub no_repeat_ngram_size: usize,
    pub seed: u64,
}

impl DecodingConfig {
    pub fn sampling(&self) -> Sampling {
        if !self.do_sample || self.temperature <= 0. {
            debug!("Using ArgMax sampling (greedy)");
            return Sampling::ArgMax;
        }

        let temperature = self.temperature;
        if self.top_p >= 1. {
            debug!("Using All sampling with temperature: {}", temperature);
            Sampling::All { temperature }
        } else {
            let p = self.top_p;
            debug!("Using TopP sampling: p={}, temperature={}", p, temperature);
            Sampling::TopP { p, temperature }
        }
    }

    pub fn create_logits_processor(&self) -> LogitsProcessor {
        LogitsProcessor::from_sampling(self.seed, self.sampling())
    }
}
