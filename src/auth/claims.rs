use serde::{Deserialize, Serialize};

/// JWT payload used for authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username at issuance
    pub uid: i64,    // account id; must still match the account holding `sub`
    pub iat: i64,    // issued at (unix seconds)
    pub exp: i64,    // expires at (unix seconds)
    pub iss: String, // issuer
    pub aud: String, // audience
}
