#![allow(dead_code)]

use anyhow::{bail, Result};
use lumi_inference_engine::{DecodingConfig, SpecialTokens, TextGenerator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Token id 0 is the only special token.
pub const SPECIAL: u32 = 0;

/// In-memory model: one token per char, answers `echo <formatted prompt>`.
///
/// Prompts containing `kaboom` panic, other prompts containing `boom` fail.
/// Records how many generations overlap so tests can check serialization.
#[derive(Debug, Default)]
pub struct EchoGenerator {
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub last_input_len: AtomicUsize,
}

impl EchoGenerator {
    pub fn with_delay(delay: Duration) -> Self {
        EchoGenerator { delay, ..Default::default() }
    }
}

fn to_tokens(text: &str) -> Vec<u32> {
    text.chars().map(|c| c as u32).collect()
}

fn to_text(tokens: &[u32]) -> String {
    tokens
        .iter()
        .filter(|&&id| id != SPECIAL)
        .filter_map(|&id| char::from_u32(id))
        .collect()
}

impl TextGenerator for EchoGenerator {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let mut tokens = vec![SPECIAL];
        tokens.extend(to_tokens(text));
        Ok(tokens)
    }

    fn generate_tokens(&self, mut tokens: Vec<u32>, _config: &DecodingConfig) -> Result<Vec<u32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.last_input_len.store(tokens.len(), Ordering::SeqCst);

        std::thread::sleep(self.delay);

        let prompt = to_text(&tokens);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if prompt.contains("kaboom") {
            panic!("kernel launch failed");
        }
        if prompt.contains("boom") {
            bail!("device out of memory");
        }

        tokens.extend(to_tokens(&format!(" echo {}", prompt)));
        tokens.push(SPECIAL);
        Ok(tokens)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        Ok(to_text(tokens))
    }

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens { pad_token_id: SPECIAL, eos_token_id: SPECIAL }
    }

    fn device_name(&self) -> String {
        "cpu".to_string()
    }

    fn parameter_count(&self) -> usize {
        124_439_808
    }
}

/// Shares counters between the test and the generator owned by `Lumi`.
#[derive(Debug, Clone)]
pub struct SharedEcho(pub std::sync::Arc<EchoGenerator>);

impl TextGenerator for SharedEcho {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        self.0.tokenize(text)
    }

    fn generate_tokens(&self, tokens: Vec<u32>, config: &DecodingConfig) -> Result<Vec<u32>> {
        self.0.generate_tokens(tokens, config)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.0.decode(tokens)
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.0.special_tokens()
    }

    fn device_name(&self) -> String {
        self.0.device_name()
    }

    fn parameter_count(&self) -> usize {
        self.0.parameter_count()
    }
}

pub fn shared_lumi(delay: Duration) -> (std::sync::Arc<lumi::Lumi>, std::sync::Arc<EchoGenerator>) {
    let generator = std::sync::Arc::new(EchoGenerator::with_delay(delay));
    let lumi = lumi::Lumi::from_generator(Box::new(SharedEcho(std::sync::Arc::clone(&generator))));
    (std::sync::Arc::new(lumi), generator)
}
