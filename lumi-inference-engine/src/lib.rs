pub mod inference_engine;
pub mod eos;
pub mod params;
pub mod template;
pub mod textgenerator;

pub use inference_engine::{InferenceEngine, ModelInference, banned_ngram_tokens};
pub use eos::EosTokenHandler;
pub use params::{DecodingConfig, GenerationOptions, GenerationParams, SpecialTokens};
pub use template::{TemplateKind, format_prompt};
pub use textgenerator::{GenerationResult, TextGenerator, MAX_INPUT_TOKENS, strip_prompt_prefix};
