use tracing::{info, warn};

use super::dto::{UpdateUserRequest, UserSummary};
use crate::{
    auth::{error::AuthError, handlers::is_valid_username, password::Hasher, principal::Principal},
    error::ApiError,
    policy,
    store::{Store, UserChanges, UserId, UserRecord, UserStore},
};

pub async fn load_user(store: &dyn Store, id: UserId) -> Result<UserRecord, ApiError> {
    store
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))
}

pub async fn list_users(store: &dyn Store, principal: &Principal) -> Result<Vec<UserRecord>, ApiError> {
    policy::can_list_all_users(principal).ensure()?;
    Ok(store.list_users().await?)
}

pub async fn search_users(
    store: &dyn Store,
    prefix: &str,
    limit: usize,
) -> Result<Vec<UserSummary>, ApiError> {
    let found = store.search_users(prefix.trim(), limit).await?;
    Ok(found.iter().map(UserSummary::from).collect())
}

pub async fn get_user(
    store: &dyn Store,
    principal: &Principal,
    id: UserId,
) -> Result<UserRecord, ApiError> {
    let user = load_user(store, id).await?;
    policy::can_read_user(principal, &user).ensure()?;
    Ok(user)
}

/// Renames and password changes. A new password needs the current one.
pub async fn update_user(
    store: &dyn Store,
    hasher: &dyn Hasher,
    principal: &Principal,
    id: UserId,
    req: UpdateUserRequest,
) -> Result<UserRecord, ApiError> {
    let user = load_user(store, id).await?;
    policy::can_mutate_user(principal, &user).ensure()?;

    let mut changes = UserChanges::default();

    if let Some(name) = req.username {
        let name = name.trim();
        if !is_valid_username(name) {
            return Err(ApiError::BadRequest(
                "Username must be 3-32 letters, digits, '_', '.' or '-'".into(),
            ));
        }
        if name != user.username {
            changes.username = Some(name.to_string());
        }
    }

    if let Some(new_password) = req.new_password {
        if new_password.is_empty() {
            return Err(ApiError::BadRequest("New password must not be empty".into()));
        }
        let current = req.current_password.unwrap_or_default();
        if !hasher.matches(&current, &user.password_digest)? {
            warn!(user_id = %user.id, "password change with wrong current password");
            return Err(AuthError::InvalidPassword.into());
        }
        changes.password_digest = Some(hasher.hash(&new_password)?);
    }

    if changes.username.is_none() && changes.password_digest.is_none() {
        return Ok(user);
    }

    let renamed = changes.username.is_some();
    let updated = store.update_user(id, changes).await?;
    info!(user_id = %updated.id, renamed, "user updated");
    Ok(updated)
}

pub async fn delete_user(store: &dyn Store, principal: &Principal, id: UserId) -> Result<(), ApiError> {
    let user = load_user(store, id).await?;
    policy::can_mutate_user(principal, &user).ensure()?;
    store.delete_user(id).await?;
    info!(user_id = %id, "user deleted");
    Ok(())
}
