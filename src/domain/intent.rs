//! Classification of inbound chat text.
//!
//! [`classify`] is pure: it resolves a message to one [`Intent`] before any
//! handler with side effects runs. Commands win over ratings.

use super::Rating;

/// Fixed commands a user can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `opt out`: stop receiving surveys.
    OptOut,
    /// `opt in`: resume receiving surveys.
    OptIn,
    /// `hello` / `hi`: introduction and sign-up link.
    Greet,
}

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// One of the fixed commands.
    Command(Command),
    /// A survey rating.
    Rating(Rating),
    /// Anything else; carries the normalized text for the reply.
    Unknown(String),
}

/// Lower-cases `text` and keeps alphabetic characters only.
///
/// `"Opt Out!"` becomes `"optout"`, `" YES. "` becomes `"yes"`.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolves inbound text to an [`Intent`].
#[must_use]
pub fn classify(text: &str) -> Intent {
    let token = normalize(text);
    let command = match token.as_str() {
        "optout" => Some(Command::OptOut),
        "optin" => Some(Command::OptIn),
        "hello" | "hi" => Some(Command::Greet),
        _ => None,
    };
    if let Some(command) = command {
        return Intent::Command(command);
    }
    match Rating::from_token(&token) {
        Some(rating) => Intent::Rating(rating),
        None => Intent::Unknown(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_everything_but_letters() {
        assert_eq!(normalize("  Opt-Out 123 "), "optout");
        assert_eq!(normalize("Maybe?!"), "maybe");
        assert_eq!(normalize("1234"), "");
    }

    #[test]
    fn commands_take_precedence() {
        assert_eq!(classify("OPT OUT"), Intent::Command(Command::OptOut));
        assert_eq!(classify("opt in"), Intent::Command(Command::OptIn));
        assert_eq!(classify("Hi!"), Intent::Command(Command::Greet));
        assert_eq!(classify("hello"), Intent::Command(Command::Greet));
    }

    #[test]
    fn ratings_are_case_insensitive() {
        assert_eq!(classify("Yes."), Intent::Rating(Rating::Yes));
        assert_eq!(classify(" no "), Intent::Rating(Rating::No));
    }

    #[test]
    fn other_text_is_unknown() {
        assert_eq!(classify("Banana"), Intent::Unknown("banana".to_string()));
        assert_eq!(classify("yes please"), Intent::Unknown("yesplease".to_string()));
    }
}
