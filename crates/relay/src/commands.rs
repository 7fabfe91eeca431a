//! Conversation-management commands typed by the user.

/// Shown by `/help`.
pub const HELP_MESSAGE: &str = "Available commands:
/clean_history : clean the memory of the bot
/chat_history : to show the conversation history
/full_chat_history : show the history of every conversation
/new_prompt <template> : create your own system prompt (must contain {history} and {input})
/current_prompt : see currently used system prompt
/reset_prompt : go back to the default system prompt
/lang [en|fr] : choose the conversation language
/help : show this message";

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Requested locale code; `None` asks the user to pick one.
    Lang(Option<String>),
    /// Raw template text following the command; may be empty.
    NewPrompt(String),
    CurrentPrompt,
    ResetPrompt,
    CleanHistory,
    ChatHistory,
    FullChatHistory,
    Unknown(String),
}

impl Command {
    /// Parse `text` as a command. Returns `None` for anything that is not
    /// a slash command, so it can be sent on as a query.
    ///
    /// A `@botname` suffix on the command word is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/')?;

        let (word, args) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };
        let name = word.split('@').next().unwrap_or(word).to_lowercase();
        if name.is_empty() {
            return None;
        }

        Some(match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "lang" => Self::Lang((!args.is_empty()).then(|| args.to_string())),
            "new_prompt" => Self::NewPrompt(args.to_string()),
            "current_prompt" => Self::CurrentPrompt,
            "reset_prompt" => Self::ResetPrompt,
            "clean_history" => Self::CleanHistory,
            "chat_history" => Self::ChatHistory,
            "full_chat_history" => Self::FullChatHistory,
            _ => Self::Unknown(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("a /path in text"), None);
        assert_eq!(Command::parse("/"), None);
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/clean_history"), Some(Command::CleanHistory));
        assert_eq!(Command::parse("/chat_history"), Some(Command::ChatHistory));
        assert_eq!(Command::parse("/full_chat_history"), Some(Command::FullChatHistory));
        assert_eq!(Command::parse("/current_prompt"), Some(Command::CurrentPrompt));
        assert_eq!(Command::parse("/reset_prompt"), Some(Command::ResetPrompt));
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(Command::parse("/help@parley_bot"), Some(Command::Help));
        assert_eq!(
            Command::parse("/lang@parley_bot fr"),
            Some(Command::Lang(Some("fr".into())))
        );
    }

    #[test]
    fn new_prompt_keeps_multiline_template() {
        let cmd = Command::parse("/new_prompt You are terse.\n{history}\nQ: {input}\nA:").unwrap();
        assert_eq!(
            cmd,
            Command::NewPrompt("You are terse.\n{history}\nQ: {input}\nA:".into())
        );
        assert_eq!(Command::parse("/new_prompt"), Some(Command::NewPrompt(String::new())));
    }

    #[test]
    fn lang_argument_is_optional() {
        assert_eq!(Command::parse("/lang"), Some(Command::Lang(None)));
        assert_eq!(Command::parse("/lang  en "), Some(Command::Lang(Some("en".into()))));
    }

    #[test]
    fn unknown_command_keeps_its_name() {
        assert_eq!(Command::parse("/Weather now"), Some(Command::Unknown("weather".into())));
    }
}
