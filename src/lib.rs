//! # meeting-surveyor
//!
//! Asks the attendees of a finished calendar event, over chat, whether the
//! meeting was effective, and reports the tally to the organizer.
//!
//! Each event moves through three one-way stages: registered, questions
//! sent, results sent. An event that is too small to survey anonymously is
//! marked not surveyable and never leaves the first stage.
//!
//! ## Architecture
//!
//! ```text
//! Calendar ingestion, Slack Events API, scheduler
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── SurveyEngine (service/)
//!     │     ├── QuestionDispatcher ── Eligibility
//!     │     ├── ResponseCollector ── CompletionPolicy
//!     │     ├── ResultsAggregator
//!     │     └── DirectoryService
//!     ├── EventBus (domain/)
//!     │
//!     ├── SurveyStore (persistence/): memory or PostgreSQL
//!     └── CalendarSource, Notifier (channels/): Slack Web API
//! ```

pub mod api;
pub mod app_state;
pub mod channels;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
