use anyhow::{bail, Context, Error as E, Result};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Deserialize;
use serde_yaml;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

/// Front end the process runs after the model is loaded
#[derive(ValueEnum, Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Line-based console on stdin/stdout (default)
    #[default]
    Interactive,
    /// HTTP JSON API
    Api,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Interactive => write!(f, "interactive"),
            Mode::Api => write!(f, "api"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Lumi model server", long_about = None)]
struct CliArgs {
    #[arg(long, env = "LUMI_DEBUG", default_value_t = false)]
    debug: bool,

    #[arg(long, env = "LUMI_MODE", default_value_t = Mode::Interactive)]
    mode: Mode,

    #[arg(long, env = "LUMI_LISTEN_ADDRESS", default_value = "127.0.0.1")]
    listen_address: String,

    #[arg(long, env = "LUMI_LISTEN_PORT", default_value_t = 8000)]
    listen_port: u16,

    #[arg(long, env = "LUMI_MODEL_FAMILY", default_value = "llama")]
    model_family: String,

    /// Directory holding config.json, weights and tokenizer.
    #[arg(long, env = "LUMI_MODEL_PATH", required_unless_present = "config_file")]
    model_path: Option<String>,

    /// Tokenizer file or directory, defaults to the model directory.
    #[arg(long, env = "LUMI_TOKENIZER_PATH")]
    tokenizer_path: Option<String>,

    #[arg(long, env = "LUMI_CONFIG_FILE")]
    config_file: Option<String>,

    /// Use different dtype than f16
    #[arg(long, env = "LUMI_DTYPE", default_value = "f16")]
    dtype: Option<String>,

    /// The seed to use when generating random samples.
    #[arg(long, env = "LUMI_SEED", default_value_t = 299792458)]
    seed: u64,

    #[arg(long, env = "LUMI_ENABLE_KV_CACHE", default_value_t = true, action = ArgAction::Set)]
    enable_kv_cache: bool,

    #[arg(long, env = "LUMI_USE_FLASH_ATTN", default_value_t = false)]
    use_flash_attn: bool,

    /// Maximum number of new tokens per answer.
    #[arg(short = 'n', long, env = "LUMI_MAX_NEW_TOKENS", default_value_t = 100)]
    max_new_tokens: usize,

    /// The temperature used to generate samples.
    #[arg(long, env = "LUMI_TEMPERATURE", default_value_t = 0.7)]
    temperature: f64,

    /// Nucleus sampling probability cutoff.
    #[arg(long, env = "LUMI_TOP_P", default_value_t = 0.9)]
    top_p: f64,

    /// Penalty to be applied for repeating tokens, 1. means no penalty.
    #[arg(long, env = "LUMI_REPETITION_PENALTY", default_value_t = 1.1)]
    repetition_penalty: f32,

    #[arg(long, env = "LUMI_DO_SAMPLE", default_value_t = true, action = ArgAction::Set)]
    do_sample: bool,

    /// Prompt template used by the console.
    #[arg(
        long,
        env = "LUMI_TEMPLATE",
        default_value = "chatml",
        value_parser = ["chatml", "chat", "instruct", "raw"]
    )]
    template: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LumiConfig {
    pub debug: bool,
    pub mode: Mode,
    pub listen_address: String,
    pub listen_port: u16,
    pub model_family: String,
    pub model_path: String,
    pub tokenizer_path: Option<String>,
    pub dtype: Option<String>,
    pub seed: u64,
    pub enable_kv_cache: bool,
    pub use_flash_attn: bool,
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f32,
    pub do_sample: bool,
    pub template: String,
}

impl Default for LumiConfig {
    fn default() -> Self {
        LumiConfig {
            debug: false,
            mode: Mode::Interactive,
            listen_address: String::from("127.0.0.1"),
            listen_port: 8000,
            model_family: String::from("llama"),
            model_path: String::new(),
            tokenizer_path: None,
            dtype: Some(String::from("f16")),
            seed: 299792458,
            enable_kv_cache: true,
            use_flash_attn: false,
            max_new_tokens: 100,
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.1,
            do_sample: true,
            template: String::from("chatml"),
        }
    }
}

impl LumiConfig {
    pub fn new() -> Result<LumiConfig, E> {
        Self::from_cli(CliArgs::parse())
    }

    /// Same as [`LumiConfig::new`] but over an explicit argument list.
    pub fn try_from_args<I, T>(args: I) -> Result<LumiConfig, E>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = CliArgs::try_parse_from(args)?;
        Self::from_cli(args)
    }

    pub fn from_yaml_file(config_path: &Path) -> Result<LumiConfig, E> {
        let content = fs::read_to_string(config_path).with_context(|| {
            format!("Config file not found: {}", config_path.to_string_lossy())
        })?;
        let config: LumiConfig =
            serde_yaml::from_str(&content).with_context(|| "Failed to deserialize YAML config")?;
        if config.model_path.is_empty() {
            bail!("model_path is missing from {}", config_path.to_string_lossy());
        }
        Ok(config)
    }

    fn from_cli(args: CliArgs) -> Result<LumiConfig, E> {
        if let Some(config_file) = args.config_file {
            return Self::from_yaml_file(Path::new(&config_file));
        }
        let model_path = args.model_path.context("--model-path is required")?;

        Ok(LumiConfig {
            debug: args.debug,
            mode: args.mode,
            listen_address: args.listen_address,
            listen_port: args.listen_port,
            model_family: args.model_family,
            model_path,
            tokenizer_path: args.tokenizer_path,
            dtype: args.dtype,
            seed: args.seed,
            enable_kv_cache: args.enable_kv_cache,
            use_flash_attn: args.use_flash_attn,
            max_new_tokens: args.max_new_tokens,
            temperature: args.temperature,
            top_p: args.top_p,
            repetition_penalty: args.repetition_penalty,
            do_sample: args.do_sample,
            template: args.template,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}
