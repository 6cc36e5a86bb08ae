//! Domain layer: identifiers, records, policies and lifecycle events.
//!
//! Everything here is free of I/O. The service layer combines these types
//! with the store, calendar and notification collaborators.

pub mod event;
pub mod event_bus;
pub mod ids;
pub mod intent;
pub mod messages;
pub mod policy;
pub mod response;
pub mod survey_event;
pub mod user;

pub use event::{Attendee, Event, EventDetails, NewEvent, RsvpStatus, Stage};
pub use event_bus::EventBus;
pub use ids::{EventId, UserId};
pub use intent::{Command, Intent};
pub use policy::{CompletionMode, EligibilityMode, SlotPolicy};
pub use response::{Rating, SurveyResponse, TallyEntry, UpsertKind};
pub use survey_event::{AbandonReason, SurveyEvent};
pub use user::{AwaitingSlot, User};
