//! Data Transfer Objects for REST request/response serialization.

pub mod directory_dto;
pub mod event_dto;
pub mod slack_dto;

pub use directory_dto::*;
pub use event_dto::*;
pub use slack_dto::*;
