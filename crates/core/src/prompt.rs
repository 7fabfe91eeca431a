//! System prompt templates and the prompt composer.
//!
//! A template carries two named slots, `{history}` and `{input}`. The composer
//! renders the windowed history into the first and the raw query into the
//! second. Templates are validated once, when a [`SystemPrompt`] is built, so
//! rendering itself cannot fail.

use serde::{Deserialize, Serialize};

use crate::error::PromptError;
use crate::message::Turn;

const HISTORY_SLOT: &str = "{history}";
const INPUT_SLOT: &str = "{input}";

/// Speaker labels used when history is rendered as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPair {
    pub human: String,
    pub assistant: String,
}

impl LabelPair {
    pub fn new(human: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            human: human.into(),
            assistant: assistant.into(),
        }
    }

    /// `Human:` / `AI:`
    pub fn human_ai() -> Self {
        Self::new("Human", "AI")
    }

    /// `Interviewer:` / `AI:`
    pub fn interviewer_ai() -> Self {
        Self::new("Interviewer", "AI")
    }
}

impl Default for LabelPair {
    fn default() -> Self {
        Self::human_ai()
    }
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SystemPrompt {
    template: String,
}

impl SystemPrompt {
    /// Build a prompt, rejecting templates without both slots.
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        if !template.contains(HISTORY_SLOT) {
            return Err(PromptError::MissingSlot("history"));
        }
        if !template.contains(INPUT_SLOT) {
            return Err(PromptError::MissingSlot("input"));
        }
        Ok(Self { template })
    }

    /// Wrap a built-in template whose slots are checked by tests.
    pub(crate) fn builtin(template: &'static str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The instruction text in front of the slots.
    ///
    /// Everything before the line holding the first slot, trimmed. Backends
    /// that take role-tagged messages or a separate context field use this
    /// instead of the full template.
    pub fn preamble(&self) -> String {
        let first_slot = [HISTORY_SLOT, INPUT_SLOT]
            .iter()
            .filter_map(|slot| self.template.find(slot))
            .min()
            .unwrap_or(self.template.len());
        let head = &self.template[..first_slot];
        let head = match head.rfind('\n') {
            Some(line_start) => &head[..line_start],
            None => head,
        };
        head.trim().to_string()
    }

    /// Render the template with the given window and query.
    pub fn compose(&self, window: &[Turn], query: &str, labels: &LabelPair) -> String {
        self.render(&render_history(window, labels), query)
    }

    /// Substitute both slots in a single left-to-right pass, so slot-like text
    /// inside the history or the query is never expanded again.
    fn render(&self, history: &str, input: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + history.len() + input.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            if let Some(after) = tail.strip_prefix(HISTORY_SLOT) {
                out.push_str(history);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(INPUT_SLOT) {
                out.push_str(input);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl TryFrom<String> for SystemPrompt {
    type Error = PromptError;

    fn try_from(template: String) -> Result<Self, Self::Error> {
        Self::new(template)
    }
}

impl From<SystemPrompt> for String {
    fn from(prompt: SystemPrompt) -> Self {
        prompt.template
    }
}

impl std::fmt::Display for SystemPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}

/// Render a window oldest-first, one `label: text` line per speaker.
pub fn render_history(window: &[Turn], labels: &LabelPair) -> String {
    let mut history = String::new();
    for turn in window {
        history.push_str(&labels.human);
        history.push_str(": ");
        history.push_str(turn.query());
        history.push('\n');
        history.push_str(&labels.assistant);
        history.push_str(": ");
        history.push_str(turn.response());
        history.push('\n');
    }
    history
}

/// Validate `template` and render it in one step.
pub fn compose(
    template: &str,
    window: &[Turn],
    query: &str,
    labels: &LabelPair,
) -> Result<String, PromptError> {
    Ok(SystemPrompt::new(template)?.compose(window, query, labels))
}

/// Drop line breaks a backend echoed in front of its answer.
pub fn strip_leading_breaks(text: &str) -> &str {
    text.trim_start_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEKHOV: &str = "You are a Russian intellectual.\nConversation: {history}\nInterviewer: {input}\nAI:";

    #[test]
    fn rejects_template_without_history() {
        assert_eq!(
            SystemPrompt::new("Answer: {input}"),
            Err(PromptError::MissingSlot("history"))
        );
    }

    #[test]
    fn rejects_template_without_input() {
        assert_eq!(
            SystemPrompt::new("{history}"),
            Err(PromptError::MissingSlot("input"))
        );
    }

    #[test]
    fn renders_history_oldest_first() {
        let window = vec![Turn::new("hello", "hi there"), Turn::new("how are you", "fine")];
        let history = render_history(&window, &LabelPair::human_ai());
        assert_eq!(history, "Human: hello\nAI: hi there\nHuman: how are you\nAI: fine\n");
    }

    #[test]
    fn composes_with_interviewer_labels() {
        let window = vec![Turn::new("Who are you?", "A doctor.")];
        let rendered =
            compose(CHEKHOV, &window, "And a writer?", &LabelPair::interviewer_ai()).unwrap();
        assert_eq!(
            rendered,
            "You are a Russian intellectual.\nConversation: Interviewer: Who are you?\nAI: A doctor.\n\nInterviewer: And a writer?\nAI:"
        );
    }

    #[test]
    fn empty_window_renders_empty_history() {
        let prompt = SystemPrompt::new("H[{history}] I[{input}]").unwrap();
        assert_eq!(prompt.compose(&[], "q", &LabelPair::default()), "H[] I[q]");
    }

    #[test]
    fn query_is_inserted_raw_and_never_reexpanded() {
        let prompt = SystemPrompt::new("{history}|{input}").unwrap();
        let rendered = prompt.compose(&[], "literal {history} and <b>", &LabelPair::default());
        assert_eq!(rendered, "|literal {history} and <b>");
    }

    #[test]
    fn unrelated_braces_survive() {
        let prompt = SystemPrompt::new("json {\"a\": 1} {history} {input} {other}").unwrap();
        let rendered = prompt.compose(&[], "x", &LabelPair::default());
        assert_eq!(rendered, "json {\"a\": 1}  x {other}");
    }

    #[test]
    fn preamble_stops_before_slot_line() {
        let prompt = SystemPrompt::new(CHEKHOV).unwrap();
        assert_eq!(prompt.preamble(), "You are a Russian intellectual.");
    }

    #[test]
    fn preamble_on_single_line_template() {
        let prompt = SystemPrompt::new("Be brief. {history} {input}").unwrap();
        assert_eq!(prompt.preamble(), "Be brief.");
    }

    #[test]
    fn strips_only_leading_breaks() {
        assert_eq!(strip_leading_breaks("\n\r\nHello\n"), "Hello\n");
        assert_eq!(strip_leading_breaks("  Hello"), "  Hello");
    }

    #[test]
    fn deserialization_validates_slots() {
        let ok: Result<SystemPrompt, _> = serde_json::from_str("\"{history} {input}\"");
        assert!(ok.is_ok());
        let bad: Result<SystemPrompt, _> = serde_json::from_str("\"no slots\"");
        assert!(bad.is_err());
    }
}
