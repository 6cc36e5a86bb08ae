//! Survey ratings and stored responses.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{EventId, UserId};

/// The closed set of accepted ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// The meeting was effective.
    Yes,
    /// The meeting was not effective.
    No,
    /// Undecided.
    Maybe,
}

impl Rating {
    /// All ratings in prompt order.
    pub const ALL: [Self; 3] = [Self::Yes, Self::No, Self::Maybe];

    /// Matches a normalized token (see [`super::intent::normalize`]).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "maybe" => Some(Self::Maybe),
            _ => None,
        }
    }

    /// Token as stored and reported.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Maybe => "maybe",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's rating of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyResponse {
    /// Rated event.
    pub event_id: EventId,
    /// Responding user.
    pub user_id: UserId,
    /// Latest rating.
    pub rating: Rating,
    /// First submission time; fixes the response's arrival position.
    pub created_at: DateTime<Utc>,
}

/// Whether a submission created or revised the stored response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    /// First response for the (event, user) pair.
    Inserted,
    /// Existing response overwritten.
    Updated,
}

/// Count of one rating within an event's responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct TallyEntry {
    /// Rating category.
    pub rating: Rating,
    /// Number of attendees who chose it.
    pub count: usize,
}

/// Counts ratings in arrival order, most frequent first.
///
/// Categories with equal counts keep the order in which they were first
/// seen.
#[must_use]
pub fn tally<I>(ratings: I) -> Vec<TallyEntry>
where
    I: IntoIterator<Item = Rating>,
{
    let mut entries: Vec<TallyEntry> = Vec::with_capacity(Rating::ALL.len());
    for rating in ratings {
        match entries.iter_mut().find(|e| e.rating == rating) {
            Some(entry) => entry.count = entry.count.saturating_add(1),
            None => entries.push(TallyEntry { rating, count: 1 }),
        }
    }
    // `sort_by` is stable, which preserves first-seen order on ties.
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_orders_by_count_then_first_seen() {
        use Rating::{Maybe, No, Yes};
        let entries = tally([Yes, No, Yes, Maybe, Yes]);
        assert_eq!(
            entries,
            vec![
                TallyEntry { rating: Yes, count: 3 },
                TallyEntry { rating: No, count: 1 },
                TallyEntry { rating: Maybe, count: 1 },
            ]
        );
    }

    #[test]
    fn tally_tie_keeps_first_seen_not_alphabetical() {
        use Rating::{Maybe, Yes};
        let entries = tally([Yes, Maybe, Maybe, Yes]);
        let order: Vec<Rating> = entries.iter().map(|e| e.rating).collect();
        assert_eq!(order, vec![Yes, Maybe]);
    }

    #[test]
    fn tally_of_nothing_is_empty() {
        assert!(tally(std::iter::empty()).is_empty());
    }

    #[test]
    fn tokens_outside_closed_set_are_rejected() {
        assert_eq!(Rating::from_token("maybe"), Some(Rating::Maybe));
        assert_eq!(Rating::from_token("Yes"), None);
        assert_eq!(Rating::from_token("banana"), None);
    }
}
