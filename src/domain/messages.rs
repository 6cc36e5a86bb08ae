//! User-facing message templates.
//!
//! The wording here is a compatibility contract with existing users; change
//! it only deliberately.

use super::TallyEntry;

/// Reply when a rating arrives but nothing is outstanding.
pub const NO_PENDING_SURVEY: &str = "Sorry, I'm not sure what meeting to assign this rating to.";

/// Reply when a survey reply is not one of the accepted ratings.
pub const UNRECOGNIZED_RESPONSE: &str =
    "Sorry, I'm only expecting responses of \"yes\", \"no\", or \"maybe\".";

/// Confirmation after `opt out`.
pub const OPT_OUT_CONFIRMATION: &str = "You've successfully opted out of meeting surveys. \
     If you ever want to receive them again in the future, just say OPT IN!";

/// Confirmation after `opt in`.
pub const OPT_IN_CONFIRMATION: &str = "You've successfully opted back into meeting surveys! \
     If you ever want to stop getting them in the future, just say OPT OUT.";

/// Separator some conferencing tools insert before their boilerplate.
const CONFERENCE_SEPARATOR: &str = "──────";

/// Descriptions shorter than this get a nudge.
const MIN_DESCRIPTION_WORDS: usize = 12;

/// OAuth sign-up link under `base_url`.
#[must_use]
pub fn signup_link(base_url: &str) -> String {
    format!("{}/auth", base_url.trim_end_matches('/'))
}

/// Survey question for a meeting.
#[must_use]
pub fn survey_prompt(title: &str) -> String {
    format!("Was the meeting \"{title}\" effective? Response with \"yes\", \"no\", or \"maybe\".")
}

/// Sign-up sentence appended for recipients without calendar access.
#[must_use]
pub fn onboarding_suffix(base_url: &str) -> String {
    format!(
        "\n\n(By the way, if you want to include these surveys on all future meetings just sign up \
         here, or reply OPT OUT to opt out of future messages: {})",
        signup_link(base_url)
    )
}

/// Acknowledgment of a first rating.
#[must_use]
pub fn ack_new(event_name: &str) -> String {
    format!("Thanks! I've set your rating for meeting {event_name}.")
}

/// Acknowledgment of a revised rating.
#[must_use]
pub fn ack_updated(event_name: &str) -> String {
    format!("Updated your rating for meeting {event_name}.")
}

/// Results summary sent to the organizer.
#[must_use]
pub fn results_summary(event_name: &str, tally: &[TallyEntry]) -> String {
    let mut message = format!("Here are the survey responses for meeting {event_name}:");
    for entry in tally {
        message.push_str(&format!(
            "\n - {} attendees said \"{}\"",
            entry.count, entry.rating
        ));
    }
    message
}

/// Reply to `hello` / `hi`.
#[must_use]
pub fn greeting(signup_base_url: Option<&str>) -> String {
    let mut message = String::from(
        "Hello! I send out surveys about meeting value. You'll get a link if you or anyone in \
         your meeting has opted-in to these surveys. Feel free to say 'opt out' at any time to \
         opt out.",
    );
    if let Some(base) = signup_base_url {
        message.push_str(&format!(
            "\n\nIf you want to include these surveys on all your future meetings just sign up \
             here: {}",
            signup_link(base)
        ));
    }
    message
}

/// Reply to text that is neither a command nor a rating.
#[must_use]
pub fn unknown_text(text: &str) -> String {
    format!("Sorry, I don't know how to respond to \"{text}\".")
}

/// Counts alphabetic words before the conferencing boilerplate.
#[must_use]
pub fn description_word_count(description: &str) -> usize {
    description
        .split(CONFERENCE_SEPARATOR)
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .filter(|w| w.chars().all(char::is_alphabetic))
        .count()
}

/// Pre-meeting hints for the organizer, or `None` when there is nothing to say.
#[must_use]
pub fn organizer_briefing(event_name: &str, description: Option<&str>) -> Option<String> {
    let words = description.map_or(0, description_word_count);
    let hint = if words == 0 {
        "\n - It looks like this event doesn't have a description, please add one!".to_string()
    } else if words < MIN_DESCRIPTION_WORDS {
        format!(
            "\n - I only see {words} words in this description, consider adding more detail \
             before the meeting starts!"
        )
    } else {
        return None;
    };
    Some(format!(
        "Some information for your upcoming meeting {event_name}:{hint}"
    ))
}
