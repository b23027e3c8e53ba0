use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};
use crate::{DecodingConfig, EosTokenHandler};

#[allow(unused_imports)]
use tracing::{info, debug};

pub trait ModelInference: Send + Sync {
    type Cache;

    fn create_cache(&self, enable_kv_cache: bool, dtype: DType, device: &Device) -> Result<Self::Cache>;
    fn forward(&self, input: &Tensor, context_index: usize, cache: &mut Self::Cache) -> Result<Tensor>;
    fn device(&self) -> &Device;
    fn dtype(&self) -> DType;
    fn use_kv_cache(&self) -> bool;
    fn eos_handler(&self) -> &EosTokenHandler;
}

/// Tokens that would complete an `n`-gram already present in `tokens`.
pub fn banned_ngram_tokens(tokens: &[u32], n: usize) -> Vec<u32> {
    if n == 0 || tokens.len() + 1 < n {
        return Vec::new();
    }

    let prefix = &tokens[tokens.len() + 1 - n..];
    let mut banned: Vec<u32> = tokens
        .windows(n)
        .filter(|window| &window[..n - 1] == prefix)
        .map(|window| window[n - 1])
        .collect();
    banned.sort_unstable();
    banned.dedup();
    banned
}

fn apply_no_repeat_ngram(logits: &Tensor, tokens: &[u32], n: usize) -> Result<Tensor> {
    let banned = banned_ngram_tokens(tokens, n);
    if banned.is_empty() {
        return Ok(logits.clone());
    }

    let mut values = logits.to_dtype(DType::F32)?.to_vec1::<f32>()?;
    for token in banned {
        if let Some(value) = values.get_mut(token as usize) {
            *value = f32::NEG_INFINITY;
        }
    }
    Ok(Tensor::new(values.as_slice(), logits.device())?)
}

pub struct InferenceEngine;

impl InferenceEngine {
    /// Autoregressive decoding. Returns the prompt tokens followed by the new ones.
    pub fn generate<M: ModelInference>(
        model: &M,
        mut tokens: Vec<u32>,
        config: &DecodingConfig,
    ) -> Result<Vec<u32>> {
        if tokens.is_empty() {
            bail!("Cannot generate from an empty token sequence");
        }

        let mut cache = model.create_cache(model.use_kv_cache(), model.dtype(), model.device())?;
        let mut logits_processor = config.create_logits_processor();

        debug!("Starting generation with {} initial tokens, KV cache: {}",
              tokens.len(), model.use_kv_cache());

        let mut token_generated: usize = 0;
        let prefill_start = std::time::Instant::now();
        let mut generation_start: Option<std::time::Instant> = None;

        for index in 0..config.max_new_tokens {
            let (context_size, context_index) = if model.use_kv_cache() && index > 0 {
                (1, tokens.len() - 1)
            } else {
                (tokens.len(), 0)
            };

            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];

            let forward_start = std::time::Instant::now();
            let input = Tensor::new(ctxt, model.device())?.unsqueeze(0)?;
            let logits = model.forward(&input, context_index, &mut cache)?;
            let logits = logits.squeeze(0)?;
            let forward_time = forward_start.elapsed();

            let logits = if config.repetition_penalty != 1. {
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    config.repetition_penalty,
                    &tokens,
                )?
            } else {
                logits
            };
            let logits = apply_no_repeat_ngram(&logits, &tokens, config.no_repeat_ngram_size)?;

            let next_token = logits_processor.sample(&logits)?;

            if index < 5 || index % 50 == 0 {
                debug!("Token {}: forward={:?}, context_len={}", index, forward_time, ctxt.len());
            }
            token_generated += 1;
            tokens.push(next_token);

            if generation_start.is_none() {
                debug!("Prefill completed in {:?} for {} tokens", prefill_start.elapsed(), tokens.len() - 1);
                generation_start = Some(std::time::Instant::now());
            }

            let is_eos = model.eos_handler().is_eos_token(next_token) || next_token == config.eos_token_id;
            if config.early_stopping && is_eos {
                break;
            }
        }

        let total_time = prefill_start.elapsed();
        let generation_time = generation_start.map(|s| s.elapsed()).unwrap_or_default();
        let generation_tokens_per_second = if generation_time.as_secs_f64() > 0.0 {
            token_generated.saturating_sub(1) as f64 / generation_time.as_secs_f64()
        } else {
            0.0
        };

        debug!(
            "{} tokens generated | Generation only: {:.2} tok/s | Prefill: {:?} | Generation: {:?}",
            token_generated, generation_tokens_per_second,
            total_time - generation_time, generation_time
        );

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationParams, SpecialTokens};

    const EOS: u32 = 9;
    const FALLBACK: u32 = 4;
    const VOCAB: usize = 12;

    /// Puts the highest logit on the scripted token for each step.
    struct ScriptedModel {
        device: Device,
        eos: EosTokenHandler,
        script: Vec<u32>,
    }

    impl ScriptedModel {
        fn new(script: Vec<u32>) -> Self {
            ScriptedModel { device: Device::Cpu, eos: EosTokenHandler::Single(EOS), script }
        }
    }

    impl ModelInference for ScriptedModel {
        type Cache = usize;

        fn create_cache(&self, _enable_kv_cache: bool, _dtype: DType, _device: &Device) -> Result<usize> {
            Ok(0)
        }

        fn forward(&self, _input: &Tensor, _context_index: usize, step: &mut usize) -> Result<Tensor> {
            let favored = self.script.get(*step).copied().unwrap_or(FALLBACK);
            *step += 1;
            let mut logits = vec![0f32; VOCAB];
            logits[FALLBACK as usize] = 5.;
            logits[favored as usize] = 10.;
            Ok(Tensor::new(logits.as_slice(), &self.device)?.unsqueeze(0)?)
        }

        fn device(&self) -> &Device {
            &self.device
        }

        fn dtype(&self) -> DType {
            DType::F32
        }

        fn use_kv_cache(&self) -> bool {
            true
        }

        fn eos_handler(&self) -> &EosTokenHandler {
            &self.eos
        }
    }

    fn greedy(max_new_tokens: usize) -> DecodingConfig {
        GenerationParams { max_new_tokens, do_sample: false, ..Default::default() }
            .decoding_config(SpecialTokens { pad_token_id: EOS, eos_token_id: EOS }, 42)
    }

    #[test]
    fn test_banned_ngram_tokens() {
        assert_eq!(banned_ngram_tokens(&[1, 2, 3, 1, 2], 3), vec![3]);
        assert_eq!(banned_ngram_tokens(&[1, 2, 3, 1, 2, 5, 1, 2], 3), vec![3, 5]);
        assert!(banned_ngram_tokens(&[1, 2, 3, 4], 3).is_empty());
        assert!(banned_ngram_tokens(&[1], 3).is_empty());
        assert!(banned_ngram_tokens(&[1, 2, 1, 2], 0).is_empty());
    }

    #[test]
    fn test_greedy_stops_at_eos() {
        let model = ScriptedModel::new(vec![5, 6, EOS, 7]);
        let tokens = InferenceEngine::generate(&model, vec![1], &greedy(10)).unwrap();
        assert_eq!(tokens, vec![1, 5, 6, EOS]);
    }

    #[test]
    fn test_max_new_tokens_cap() {
        let model = ScriptedModel::new(vec![5, 6, 7, 8]);
        let tokens = InferenceEngine::generate(&model, vec![1], &greedy(2)).unwrap();
        assert_eq!(tokens, vec![1, 5, 6]);

        let tokens = InferenceEngine::generate(&model, vec![1, 2], &greedy(0)).unwrap();
        assert_eq!(tokens, vec![1, 2]);
    }

    #[test]
    fn test_repeated_trigram_is_banned() {
        let model = ScriptedModel::new(vec![3]);
        let tokens = InferenceEngine::generate(&model, vec![1, 2, 3, 1, 2], &greedy(1)).unwrap();
        assert_eq!(tokens, vec![1, 2, 3, 1, 2, FALLBACK]);
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let model = ScriptedModel::new(vec![5, 6, 7, 8, 10, 11]);
        let config = GenerationParams { max_new_tokens: 6, temperature: 5.0, top_p: 0.99, ..Default::default() }
            .decoding_config(SpecialTokens { pad_token_id: EOS, eos_token_id: EOS }, 1234);

        let first = InferenceEngine::generate(&model, vec![1], &config).unwrap();
        let second = InferenceEngine::generate(&model, vec![1], &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_prompt_is_an_error() {
        let model = ScriptedModel::new(vec![5]);
        assert!(InferenceEngine::generate(&model, Vec::new(), &greedy(3)).is_err());
    }
}
