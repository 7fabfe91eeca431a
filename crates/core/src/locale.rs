//! Supported locales and their default personas.
//!
//! Every locale owns a default system prompt and the label pair its history
//! is rendered with. A conversation that has no custom prompt uses the
//! persona of its current locale.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::prompt::{LabelPair, SystemPrompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Fr,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Fr];

    /// Lowercase ISO 639-1 code, as sent to backends.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }

    /// Text of the reply-keyboard button that selects this locale.
    pub fn button_label(self) -> &'static str {
        match self {
            Self::En => "Chat in English",
            Self::Fr => "Parler en français",
        }
    }

    /// Confirmation sent after the locale was switched.
    pub fn confirmation(self) -> &'static str {
        match self {
            Self::En => "OK, we'll continue in English.",
            Self::Fr => "D'accord, on va continuer en français.",
        }
    }

    /// Match a reply-keyboard button press.
    pub fn from_button(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.button_label() == text.trim())
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "fr" | "french" | "français" | "francais" => Ok(Self::Fr),
            other => Err(Error::Config {
                message: format!("unsupported locale '{other}' (supported: en, fr)"),
            }),
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code().to_uppercase())
    }
}

/// The default prompt and labels for one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub prompt: SystemPrompt,
    pub labels: LabelPair,
}

/// Process-wide default personas, one per supported locale.
#[derive(Debug, Clone)]
pub struct PromptBook {
    default_locale: Locale,
    default_persona: Persona,
    personas: HashMap<Locale, Persona>,
}

impl PromptBook {
    /// Build a book; the default locale must have a persona.
    pub fn new(default_locale: Locale, personas: HashMap<Locale, Persona>) -> Result<Self, Error> {
        let default_persona = personas
            .get(&default_locale)
            .cloned()
            .ok_or_else(|| Error::Config {
                message: format!("no persona configured for default locale {default_locale}"),
            })?;
        Ok(Self {
            default_locale,
            default_persona,
            personas,
        })
    }

    pub fn default_locale(&self) -> Locale {
        self.default_locale
    }

    /// Persona for `locale`, or the default locale's persona when that locale
    /// has none configured.
    pub fn persona(&self, locale: Locale) -> &Persona {
        self.personas.get(&locale).unwrap_or(&self.default_persona)
    }

    pub fn supports(&self, locale: Locale) -> bool {
        self.personas.contains_key(&locale)
    }
}

impl Default for PromptBook {
    fn default() -> Self {
        let personas = Locale::ALL
            .into_iter()
            .map(|locale| (locale, builtin_persona(locale)))
            .collect();
        Self {
            default_locale: Locale::En,
            default_persona: builtin_persona(Locale::En),
            personas,
        }
    }
}

/// The built-in persona template for a locale.
pub fn builtin_template(locale: Locale) -> &'static str {
    match locale {
        Locale::En => concat!(
            "You are an AI epitome of a Russian intellectual, speaking in Chekhovian style ",
            "with subtle humor and irony. You answer your interviewer questions at ease, ",
            "and there are no taboo topics for you.\n",
            "Conversation: {history}\n",
            "Interviewer: {input}\n",
            "AI:"
        ),
        Locale::Fr => concat!(
            "Tu es un assistant IA cultivé et bienveillant. Tu réponds toujours en français, ",
            "avec précision et une pointe d'humour.\n",
            "Conversation : {history}\n",
            "Human: {input}\n",
            "AI:"
        ),
    }
}

/// The built-in label pair for a locale.
pub fn builtin_labels(locale: Locale) -> LabelPair {
    match locale {
        Locale::En => LabelPair::interviewer_ai(),
        Locale::Fr => LabelPair::human_ai(),
    }
}

fn builtin_persona(locale: Locale) -> Persona {
    Persona {
        prompt: SystemPrompt::builtin(builtin_template(locale)),
        labels: builtin_labels(locale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("EN".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("fr".parse::<Locale>().unwrap(), Locale::Fr);
        assert!("ru".parse::<Locale>().is_err());
    }

    #[test]
    fn buttons_map_back_to_locales() {
        for locale in Locale::ALL {
            assert_eq!(Locale::from_button(locale.button_label()), Some(locale));
        }
        assert_eq!(Locale::from_button("Говорить по-русски"), None);
    }

    #[test]
    fn builtin_book_covers_all_locales() {
        let book = PromptBook::default();
        assert_eq!(book.default_locale(), Locale::En);
        for locale in Locale::ALL {
            assert!(book.supports(locale));
        }
        assert_eq!(book.persona(Locale::En).labels, LabelPair::interviewer_ai());
        assert_eq!(book.persona(Locale::Fr).labels, LabelPair::human_ai());
    }

    #[test]
    fn builtin_templates_have_both_slots() {
        for locale in Locale::ALL {
            assert!(SystemPrompt::new(builtin_template(locale)).is_ok(), "{locale}");
        }
    }

    #[test]
    fn book_requires_default_persona() {
        let result = PromptBook::new(Locale::Fr, HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn missing_locale_falls_back_to_default() {
        let mut personas = HashMap::new();
        personas.insert(Locale::En, builtin_persona(Locale::En));
        let book = PromptBook::new(Locale::En, personas).unwrap();
        assert!(!book.supports(Locale::Fr));
        assert_eq!(book.persona(Locale::Fr), book.persona(Locale::En));
    }
}
