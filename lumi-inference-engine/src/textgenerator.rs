use anyhow::Error as E;
use anyhow::Result;

use crate::{DecodingConfig, GenerationParams, SpecialTokens};

#[allow(unused_imports)]
use tracing::{info, debug, warn};

/// Longest prompt, in tokens, handed to the model.
pub const MAX_INPUT_TOKENS: usize = 2048;

pub const DEFAULT_SEED: u64 = 299792458;

/// Formatted prompt and the text generated after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub formatted_prompt: String,
    pub completion: String,
}

/// A loaded model together with its tokenizer.
///
/// Implementations are not expected to tolerate concurrent calls; callers
/// serialize access.
pub trait TextGenerator: std::fmt::Debug + Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, E>;
    /// Full output sequence, prompt tokens included.
    fn generate_tokens(&self, tokens: Vec<u32>, config: &DecodingConfig) -> Result<Vec<u32>, E>;
    /// Decode with special tokens removed.
    fn decode(&self, tokens: &[u32]) -> Result<String, E>;
    fn special_tokens(&self) -> SpecialTokens;
    fn device_name(&self) -> String;
    fn parameter_count(&self) -> usize;

    fn seed(&self) -> u64 {
        DEFAULT_SEED
    }

    /// Format, encode, generate, decode and cut the prompt off the output.
    fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<GenerationResult, E> {
        let formatted_prompt = params.template.apply(prompt);

        let mut tokens = self.tokenize(&formatted_prompt)?;
        if tokens.len() > MAX_INPUT_TOKENS {
            warn!("Prompt truncated from {} to {} tokens", tokens.len(), MAX_INPUT_TOKENS);
            tokens.truncate(MAX_INPUT_TOKENS);
        }

        let config = params.decoding_config(self.special_tokens(), self.seed());
        let output = self.generate_tokens(tokens, &config)?;
        let decoded = self.decode(&output)?;

        let completion = strip_prompt_prefix(&decoded, &formatted_prompt);
        Ok(GenerationResult { formatted_prompt, completion })
    }
}

/// Drop as many leading characters of `decoded` as `prompt` has, then trim.
pub fn strip_prompt_prefix(decoded: &str, prompt: &str) -> String {
    let skip = prompt.chars().count();
    let rest = match decoded.char_indices().nth(skip) {
        Some((offset, _)) => &decoded[offset..],
        None => "",
    };
    rest.trim().to_string()
}
