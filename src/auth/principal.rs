use tracing::{info, warn};

use super::{claims::Claims, error::AuthError, password::Hasher};
use crate::error::ApiError;
use crate::store::{NewUser, Role, StoreError, UserId, UserRecord, UserStore};

/// The caller of a request: who they are and what role they hold.
///
/// Only built from a loaded [`UserRecord`], so the id always refers to an
/// account that existed when the request was authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    id: UserId,
    username: String,
    role: Role,
}

impl Principal {
    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&UserRecord> for Principal {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Login input. Never persisted.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Turns verified claims or login credentials into a [`Principal`].
pub struct PrincipalResolver<'a, U: ?Sized, H: ?Sized> {
    users: &'a U,
    hasher: &'a H,
}

impl<'a, U, H> PrincipalResolver<'a, U, H>
where
    U: UserStore + ?Sized,
    H: Hasher + ?Sized,
{
    pub fn new(users: &'a U, hasher: &'a H) -> Self {
        Self { users, hasher }
    }

    /// The account must still hold the token's username and carry its id.
    pub async fn resolve_from_token(&self, claims: &Claims) -> Result<Principal, ApiError> {
        match self.users.find_user_by_username(&claims.sub).await? {
            Some(user) if user.id.0 == claims.uid => Ok(Principal::from(&user)),
            Some(user) => {
                warn!(sub = %claims.sub, uid = claims.uid, holder = %user.id, "token subject now names another account");
                Err(AuthError::IdentityNotFound.into())
            }
            None => {
                warn!(sub = %claims.sub, "token subject no longer exists");
                Err(AuthError::IdentityNotFound.into())
            }
        }
    }

    /// First login for an unknown username creates the account.
    pub async fn resolve_or_provision_on_login(
        &self,
        credential: &Credential,
    ) -> Result<(Principal, bool), ApiError> {
        if let Some(user) = self.users.find_user_by_username(&credential.username).await? {
            self.check_password(&user, &credential.password)?;
            return Ok((Principal::from(&user), false));
        }

        let digest = self.hasher.hash(&credential.password)?;
        let created = self
            .users
            .create_user(NewUser {
                username: credential.username.clone(),
                password_digest: digest,
                role: Role::User,
            })
            .await;

        match created {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "account provisioned on first login");
                Ok((Principal::from(&user), true))
            }
            Err(StoreError::Conflict(_)) => {
                // lost a race with a concurrent first login for the same name
                let user = self
                    .users
                    .find_user_by_username(&credential.username)
                    .await?
                    .ok_or(StoreError::NotFound("user"))?;
                self.check_password(&user, &credential.password)?;
                Ok((Principal::from(&user), false))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_password(&self, user: &UserRecord, plain: &str) -> Result<(), ApiError> {
        if self.hasher.matches(plain, &user.password_digest)? {
            Ok(())
        } else {
            warn!(user_id = %user.id, "login with wrong password");
            Err(AuthError::InvalidCredentials.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::fast_hasher;
    use crate::store::{MemoryStore, UserChanges};

    fn credential(username: &str, password: &str) -> Credential {
        Credential {
            username: username.into(),
            password: password.into(),
        }
    }

    fn claims_for(sub: &str, uid: UserId) -> Claims {
        Claims {
            sub: sub.into(),
            uid: uid.0,
            iat: 0,
            exp: i64::MAX,
            iss: "t".into(),
            aud: "t".into(),
        }
    }

    #[tokio::test]
    async fn first_login_provisions_user_account() {
        let store = MemoryStore::new();
        let hasher = fast_hasher();
        let resolver = PrincipalResolver::new(&store, &hasher);

        let (principal, is_new) = resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();
        assert!(is_new);
        assert_eq!(principal.username(), "erin");
        assert_eq!(principal.role(), Role::User);

        let stored = store.find_user_by_username("erin").await.unwrap().unwrap();
        assert_eq!(stored.id, principal.id());
        assert_ne!(stored.password_digest, "p1");
    }

    #[tokio::test]
    async fn second_login_returns_same_account() {
        let store = MemoryStore::new();
        let hasher = fast_hasher();
        let resolver = PrincipalResolver::new(&store, &hasher);

        let (first, _) = resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();
        let (second, is_new) = resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();
        assert!(!is_new);
        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let store = MemoryStore::new();
        let hasher = fast_hasher();
        let resolver = PrincipalResolver::new(&store, &hasher);

        resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();
        let err = resolver
            .resolve_or_provision_on_login(&credential("erin", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn token_subject_resolves_to_stored_identity() {
        let store = MemoryStore::new();
        let hasher = fast_hasher();
        let resolver = PrincipalResolver::new(&store, &hasher);
        let (created, _) = resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();

        let principal = resolver
            .resolve_from_token(&claims_for("erin", created.id()))
            .await
            .unwrap();
        assert_eq!(principal, created);
    }

    #[tokio::test]
    async fn renamed_subject_is_identity_not_found() {
        let store = MemoryStore::new();
        let hasher = fast_hasher();
        let resolver = PrincipalResolver::new(&store, &hasher);
        let (loaded, _) = resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();

        store
            .update_user(
                loaded.id(),
                UserChanges {
                    username: Some("erin-renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = resolver
            .resolve_from_token(&claims_for("erin", loaded.id()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::IdentityNotFound)));

        // the already loaded principal still carries the stable id
        let renamed = resolver
            .resolve_from_token(&claims_for("erin-renamed", loaded.id()))
            .await
            .unwrap();
        assert_eq!(renamed.id(), loaded.id());
    }

    #[tokio::test]
    async fn deleted_subject_is_identity_not_found() {
        let store = MemoryStore::new();
        let hasher = fast_hasher();
        let resolver = PrincipalResolver::new(&store, &hasher);
        let (p, _) = resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();
        store.delete_user(p.id()).await.unwrap();

        let err = resolver
            .resolve_from_token(&claims_for("erin", p.id()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::IdentityNotFound)));
    }

    #[tokio::test]
    async fn reused_username_does_not_inherit_old_tokens() {
        let store = MemoryStore::new();
        let hasher = fast_hasher();
        let resolver = PrincipalResolver::new(&store, &hasher);
        let (original, _) = resolver
            .resolve_or_provision_on_login(&credential("erin", "p1"))
            .await
            .unwrap();
        store
            .update_user(
                original.id(),
                UserChanges {
                    username: Some("erin2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (newcomer, is_new) = resolver
            .resolve_or_provision_on_login(&credential("erin", "other"))
            .await
            .unwrap();
        assert!(is_new);
        assert_ne!(newcomer.id(), original.id());

        let err = resolver
            .resolve_from_token(&claims_for("erin", original.id()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::IdentityNotFound)));

        let fresh = resolver
            .resolve_from_token(&claims_for("erin", newcomer.id()))
            .await
            .unwrap();
        assert_eq!(fresh, newcomer);
    }
}
