//! Prompt templates
//!
//! A template wraps the raw user prompt into the text the model actually
//! sees. The wrapped text is also the prefix stripped from the decoded output,
//! so every rule here must stay byte-exact.

use std::fmt;

const CHATML_START: &str = "<|im_start|>";
const CHATML_END: &str = "<|im_end|>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TemplateKind {
    #[default]
    ChatMl,
    Chat,
    Instruct,
    Raw,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::ChatMl,
        TemplateKind::Chat,
        TemplateKind::Instruct,
        TemplateKind::Raw,
    ];

    /// Resolve a template by name. Unknown names fall back to `Raw`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "chatml" => TemplateKind::ChatMl,
            "chat" => TemplateKind::Chat,
            "instruct" => TemplateKind::Instruct,
            _ => TemplateKind::Raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::ChatMl => "chatml",
            TemplateKind::Chat => "chat",
            TemplateKind::Instruct => "instruct",
            TemplateKind::Raw => "raw",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(TemplateKind::name).collect()
    }

    pub fn apply(&self, prompt: &str) -> String {
        match self {
            TemplateKind::ChatMl => format!(
                "{CHATML_START}user\n{prompt}\n{CHATML_END}\n{CHATML_START}assistant\n"
            ),
            TemplateKind::Chat => format!("Human: {prompt}\n\nAssistant: "),
            TemplateKind::Instruct => format!("### Instruction:\n{prompt}\n\n### Response:\n"),
            TemplateKind::Raw => prompt.to_string(),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for TemplateKind {
    fn from(name: &str) -> Self {
        TemplateKind::from_name(name)
    }
}

/// Wrap `prompt` according to `template`.
pub fn format_prompt(prompt: &str, template: TemplateKind) -> String {
    template.apply(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chatml_exact_output() {
        assert_eq!(
            format_prompt("hello", TemplateKind::ChatMl),
            "<|im_start|>user\nhello\n<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_chat_and_instruct_exact_output() {
        assert_eq!(
            format_prompt("hi there", TemplateKind::Chat),
            "Human: hi there\n\nAssistant: "
        );
        assert_eq!(
            format_prompt("sum 2 and 2", TemplateKind::Instruct),
            "### Instruction:\nsum 2 and 2\n\n### Response:\n"
        );
    }

    #[test]
    fn test_raw_is_identity() {
        for prompt in ["", "plain", "multi\nline\n", "  padded  ", "<|im_start|>"] {
            assert_eq!(format_prompt(prompt, TemplateKind::Raw), prompt);
        }
    }

    #[test]
    fn test_unknown_name_falls_back_to_raw() {
        assert_eq!(TemplateKind::from_name("alpaca"), TemplateKind::Raw);
        assert_eq!(TemplateKind::from_name("ChatML"), TemplateKind::Raw);
        assert_eq!(TemplateKind::from_name(""), TemplateKind::Raw);
        assert_eq!(format_prompt("x", TemplateKind::from("unknown")), "x");
    }

    #[test]
    fn test_format_is_deterministic() {
        for template in TemplateKind::ALL {
            let prompt = "Quelle heure est-il ?\n";
            assert_eq!(format_prompt(prompt, template), format_prompt(prompt, template));
        }
    }

    #[test]
    fn test_names_round_trip() {
        assert_eq!(TemplateKind::names(), vec!["chatml", "chat", "instruct", "raw"]);
        for template in TemplateKind::ALL {
            assert_eq!(TemplateKind::from_name(template.name()), template);
        }
    }
}
