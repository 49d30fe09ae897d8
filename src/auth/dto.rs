use serde::{Deserialize, Serialize};

use crate::store::{Role, UserId};

/// Request body for login. Unknown usernames are provisioned on first use.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub id: UserId,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}
