//! Interactive console
//!
//! Reads one prompt per line, answers it, and loops until an exit keyword,
//! end of input, or Ctrl+C.

use anyhow::{anyhow, Result};
use lumi_config::LumiConfig;
use lumi_inference_engine::{GenerationOptions, GenerationParams};
use std::io::{BufRead, Write};
use std::sync::Arc;

use crate::Lumi;

#[allow(unused_imports)]
use tracing::{info, debug, error, warn};

const EXIT_KEYWORDS: [&str; 3] = ["exit", "quit", "q"];
const RULE: &str = "==================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleState {
    Idle,
    AwaitingInput,
    Generating,
    Exited,
}

/// What a line read from the console asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Exit,
    Empty,
    Prompt(String),
}

impl ConsoleInput {
    /// `None` means end of input.
    pub fn classify(line: Option<&str>) -> Self {
        let Some(line) = line else {
            return ConsoleInput::Exit;
        };

        let line = line.trim();
        if EXIT_KEYWORDS.contains(&line.to_lowercase().as_str()) {
            ConsoleInput::Exit
        } else if line.is_empty() {
            ConsoleInput::Empty
        } else {
            ConsoleInput::Prompt(line.to_string())
        }
    }
}

/// Generation parameters the console uses for every turn.
pub fn console_params(config: &LumiConfig) -> GenerationParams {
    GenerationParams::from_options(GenerationOptions {
        max_new_tokens: Some(config.max_new_tokens),
        temperature: Some(config.temperature),
        top_p: Some(config.top_p),
        repetition_penalty: Some(config.repetition_penalty),
        do_sample: Some(config.do_sample),
        template: Some(config.template.clone()),
    })
}

pub struct Console {
    lumi: Arc<Lumi>,
    params: GenerationParams,
    model_path: String,
}

impl Console {
    pub fn new(lumi: Arc<Lumi>, config: &LumiConfig) -> Self {
        Self::with_params(lumi, console_params(config), config.model_path.clone())
    }

    pub fn with_params(lumi: Arc<Lumi>, params: GenerationParams, model_path: String) -> Self {
        Console { lumi, params, model_path }
    }

    /// Drive the session until it exits. Must run outside the async runtime.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> Result<ConsoleState> {
        let mut state = ConsoleState::Idle;
        let mut pending: Option<String> = None;

        while state != ConsoleState::Exited {
            state = match state {
                ConsoleState::Idle => {
                    self.print_banner(&mut output)?;
                    ConsoleState::AwaitingInput
                }
                ConsoleState::AwaitingInput => {
                    write!(output, "\nYou: ")?;
                    output.flush()?;

                    let mut line = String::new();
                    let read = input.read_line(&mut line)?;
                    let line = (read > 0).then_some(line.as_str());

                    match ConsoleInput::classify(line) {
                        ConsoleInput::Exit => {
                            writeln!(output, "Goodbye!")?;
                            ConsoleState::Exited
                        }
                        ConsoleInput::Empty => ConsoleState::AwaitingInput,
                        ConsoleInput::Prompt(prompt) => {
                            pending = Some(prompt);
                            ConsoleState::Generating
                        }
                    }
                }
                ConsoleState::Generating => {
                    if let Some(prompt) = pending.take() {
                        self.answer(&prompt, &mut output)?;
                    }
                    ConsoleState::AwaitingInput
                }
                ConsoleState::Exited => ConsoleState::Exited,
            };
        }

        Ok(state)
    }

    fn answer<W: Write>(&self, prompt: &str, output: &mut W) -> Result<()> {
        write!(output, "Lumi: ")?;
        output.flush()?;

        match self.lumi.generate_blocking(prompt, &self.params) {
            Ok(result) => writeln!(output, "{}", result.completion)?,
            Err(e) => {
                error!("Generation failed: {}", e);
                writeln!(output, "Generation error: {}", e)?;
            }
        }
        Ok(())
    }

    fn print_banner<W: Write>(&self, output: &mut W) -> Result<()> {
        writeln!(output, "Lumi interactive mode")?;
        writeln!(output, "{RULE}")?;
        writeln!(output, "Model: {}", self.model_path)?;
        writeln!(output, "Template: {}", self.params.template)?;
        writeln!(
            output,
            "Parameters: temp={}, top_p={}",
            self.params.temperature, self.params.top_p
        )?;
        writeln!(output, "Type 'exit', 'quit' or Ctrl+C to quit")?;
        writeln!(output, "{RULE}")?;
        Ok(())
    }
}

/// Run the console on stdin/stdout. Ctrl+C ends the process right away.
pub async fn run_interactive(lumi: Arc<Lumi>, config: &LumiConfig) -> Result<()> {
    let console = Console::new(lumi, config);
    let session = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        console.run(stdin.lock(), std::io::stdout())
    });

    tokio::select! {
        res = session => {
            res.map_err(|e| anyhow!("Console task failed: {}", e))??;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n\nGoodbye!");
            info!("Interrupted, exiting");
            std::process::exit(0);
        }
    }

    Ok(())
}
