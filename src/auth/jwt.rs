use jsonwebtoken::{
    crypto, decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::config::{ConfigError, JwtConfig};
use crate::store::UserId;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,
}

/// Process-wide signing material. Built once at startup and never rotated.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
        })
    }

    /// Signs `{sub, uid, iat = now, exp = now + ttl}`. Same inputs give the same token.
    pub fn issue(
        &self,
        subject: &str,
        user_id: UserId,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range"))?;
        let claims = Claims {
            sub: subject.to_string(),
            uid: user_id.0,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)?;
        debug!(sub = %subject, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    /// Signs for `subject` with the configured lifetime.
    pub fn sign_for(
        &self,
        subject: &str,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        self.issue(subject, user_id, now, self.ttl)
    }

    /// Checks structure, then the MAC over the raw `header.payload` bytes, and
    /// only then decodes claims and compares `now` with the expiry.
    pub fn verify(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let (message, signature) = split_compact(token)?;

        let mac_ok = crypto::verify(signature, message.as_bytes(), &self.decoding, ALGORITHM)
            .map_err(|_| TokenError::Malformed)?;
        if !mac_ok {
            return Err(TokenError::SignatureInvalid);
        }

        let claims = decode::<Claims>(token, &self.decoding, &self.validation())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                _ => TokenError::Malformed,
            })?
            .claims;

        let expires_at =
            OffsetDateTime::from_unix_timestamp(claims.exp).map_err(|_| TokenError::Malformed)?;
        if now >= expires_at {
            return Err(TokenError::Expired);
        }

        debug!(sub = %claims.sub, "jwt verified");
        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        // expiry is checked against the injected clock instead
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }
}

/// Splits a compact JWT into the signed message and its signature segment.
fn split_compact(token: &str) -> Result<(&str, &str), TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };
    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed);
    }
    let message_len = header.len() + 1 + payload.len();
    Ok((&token[..message_len], signature))
}
