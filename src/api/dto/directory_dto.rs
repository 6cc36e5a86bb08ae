//! Directory sync and credential DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::persistence::DirectoryMember;

/// Request body for `POST /directory`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncDirectoryRequest {
    /// Current workspace members.
    pub members: Vec<DirectoryMember>,
}

/// Response body for `POST /directory`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncDirectoryResponse {
    /// Members in the request.
    pub received: usize,
    /// Users created by this sync.
    pub created: usize,
}

/// Request body for `POST /credentials`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialRequest {
    /// Email the credential belongs to.
    pub email: String,
    /// Calendar refresh token from the OAuth flow.
    pub refresh_token: String,
}
