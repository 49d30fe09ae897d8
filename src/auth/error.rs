//! Authentication failures. Every variant is terminal for the request and maps
//! to 401.

use thiserror::Error;

use super::jwt::TokenError;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header with a Bearer token is required")]
    MissingCredentials,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Token signature is invalid")]
    TokenSignatureInvalid,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    InvalidPassword,

    // worded like any other token failure so account existence is not leaked
    #[error("Token does not identify an active account")]
    IdentityNotFound,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::TokenSignatureInvalid => "token_signature_invalid",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidPassword => "invalid_password",
            AuthError::IdentityNotFound => "identity_not_found",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::SignatureInvalid => AuthError::TokenSignatureInvalid,
            TokenError::Expired => AuthError::TokenExpired,
        }
    }
}
