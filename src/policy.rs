//! Resource-level authorization rules.
//!
//! Every rule is a pure function of the caller and the current ownership facts
//! of the target. Identities are compared by [`UserId`] only.

use thiserror::Error;

use crate::auth::principal::Principal;
use crate::store::{Board, Task, UserId, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

/// A `Deny` turned into an error; surfaces as 403.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{0}")]
pub struct Denied(pub &'static str);

impl Decision {
    fn allow_if(cond: bool, reason: &'static str) -> Self {
        if cond {
            Decision::Allow
        } else {
            Decision::Deny(reason)
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn ensure(self) -> Result<(), Denied> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(Denied(reason)),
        }
    }

    fn and_then(self, next: impl FnOnce() -> Decision) -> Decision {
        match self {
            Decision::Allow => next(),
            deny => deny,
        }
    }
}

fn is_creator(principal: &Principal, board: &Board) -> bool {
    principal.id() == board.created_by
}

// ---- boards ----

pub fn can_read_board(principal: &Principal, board: &Board) -> Decision {
    Decision::allow_if(
        is_creator(principal, board) || board.is_member(principal.id()),
        "not a member of this board",
    )
}

/// Rename, describe or delete.
pub fn can_mutate_board(principal: &Principal, board: &Board) -> Decision {
    Decision::allow_if(is_creator(principal, board), "only the board creator can do this")
}

pub fn can_add_or_remove_member(principal: &Principal, board: &Board) -> Decision {
    Decision::allow_if(
        is_creator(principal, board),
        "only the board creator can manage members",
    )
}

/// The creator keeps membership for the lifetime of the board.
pub fn can_remove_member(principal: &Principal, board: &Board, member: UserId) -> Decision {
    can_add_or_remove_member(principal, board).and_then(|| {
        Decision::allow_if(member != board.created_by, "creator cannot leave own board")
    })
}

pub fn can_create_task_on_board(principal: &Principal, board: &Board) -> Decision {
    Decision::allow_if(
        board.is_member(principal.id()),
        "must be a board member to add tasks",
    )
}

pub fn can_remove_task_from_board(principal: &Principal, board: &Board, task: &Task) -> Decision {
    Decision::allow_if(
        is_creator(principal, board) || task.created_by == Some(principal.id()),
        "only the board creator or the task creator can remove this task",
    )
}

// ---- tasks (decided on the parent board) ----

pub fn can_read_task(principal: &Principal, board: &Board) -> Decision {
    can_read_board(principal, board)
}

/// Title, description, status and unassignment.
pub fn can_update_task(principal: &Principal, board: &Board) -> Decision {
    can_read_board(principal, board)
}

pub fn can_delete_task(principal: &Principal, board: &Board, task: &Task) -> Decision {
    can_remove_task_from_board(principal, board, task)
}

pub fn can_assign_task(principal: &Principal, board: &Board, assignee: UserId) -> Decision {
    can_update_task(principal, board).and_then(|| {
        Decision::allow_if(board.is_member(assignee), "assignee not a board member")
    })
}

// ---- users ----

pub fn can_list_all_users(principal: &Principal) -> Decision {
    Decision::allow_if(principal.is_admin(), "only administrators can list all users")
}

pub fn can_read_user(principal: &Principal, target: &UserRecord) -> Decision {
    Decision::allow_if(
        principal.id() == target.id || principal.is_admin(),
        "you can only see your own profile",
    )
}

/// Profile update, password change and deletion are self-service only.
pub fn can_mutate_user(principal: &Principal, target: &UserRecord) -> Decision {
    Decision::allow_if(
        principal.id() == target.id,
        "you can only change your own account",
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use time::OffsetDateTime;

    use super::*;
    use crate::store::{BoardId, Role, TaskId, TaskStatus};

    fn user(id: i64, role: Role) -> UserRecord {
        UserRecord {
            id: UserId(id),
            username: format!("user{id}"),
            password_digest: String::new(),
            role,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn principal(id: i64) -> Principal {
        Principal::from(&user(id, Role::User))
    }

    fn admin(id: i64) -> Principal {
        Principal::from(&user(id, Role::Admin))
    }

    fn board(creator: i64, members: &[i64]) -> Board {
        let mut set: BTreeSet<UserId> = members.iter().copied().map(UserId).collect();
        set.insert(UserId(creator));
        Board {
            id: BoardId(1),
            name: "b".into(),
            description: None,
            created_by: UserId(creator),
            members: set,
        }
    }

    fn task(created_by: Option<i64>) -> Task {
        Task {
            id: TaskId(1),
            board_id: BoardId(1),
            title: "t".into(),
            description: None,
            status: TaskStatus::Future,
            assigned_to: None,
            created_by: created_by.map(UserId),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn read_board_allows_exactly_creator_and_members() {
        let b = board(1, &[2, 3, 7]);
        for id in 0..50 {
            let expected = id == 1 || [2, 3, 7].contains(&id);
            assert_eq!(
                can_read_board(&principal(id), &b).is_allowed(),
                expected,
                "id {id}"
            );
        }
    }

    #[test]
    fn creator_outside_member_set_can_still_read() {
        let mut b = board(1, &[2]);
        b.members.remove(&UserId(1));
        assert!(can_read_board(&principal(1), &b).is_allowed());
    }

    #[test]
    fn mutate_board_denies_every_non_creator_including_members() {
        let b = board(1, &[2, 3]);
        assert!(can_mutate_board(&principal(1), &b).is_allowed());
        for id in 2..50 {
            assert!(!can_mutate_board(&principal(id), &b).is_allowed(), "id {id}");
        }
    }

    #[test]
    fn admins_get_no_board_override() {
        let b = board(1, &[]);
        assert!(!can_read_board(&admin(9), &b).is_allowed());
        assert!(!can_mutate_board(&admin(9), &b).is_allowed());
    }

    #[test]
    fn member_management_is_creator_only() {
        let b = board(1, &[2]);
        assert!(can_add_or_remove_member(&principal(1), &b).is_allowed());
        assert!(!can_add_or_remove_member(&principal(2), &b).is_allowed());
    }

    #[test]
    fn creator_cannot_be_removed_from_members() {
        let b = board(1, &[2]);
        assert!(can_remove_member(&principal(1), &b, UserId(2)).is_allowed());
        assert_eq!(
            can_remove_member(&principal(1), &b, UserId(1)),
            Decision::Deny("creator cannot leave own board")
        );
    }

    #[test]
    fn task_creation_requires_membership() {
        let b = board(1, &[2]);
        assert!(can_create_task_on_board(&principal(2), &b).is_allowed());
        assert!(!can_create_task_on_board(&principal(3), &b).is_allowed());
    }

    #[test]
    fn task_removal_is_board_creator_or_task_creator() {
        let b = board(1, &[2, 3]);
        let t = task(Some(2));
        assert!(can_remove_task_from_board(&principal(1), &b, &t).is_allowed());
        assert!(can_remove_task_from_board(&principal(2), &b, &t).is_allowed());
        assert!(!can_remove_task_from_board(&principal(3), &b, &t).is_allowed());
        assert!(!can_delete_task(&principal(3), &b, &t).is_allowed());
    }

    #[test]
    fn orphaned_task_is_removable_only_by_board_creator() {
        let b = board(1, &[2]);
        let t = task(None);
        assert!(can_delete_task(&principal(1), &b, &t).is_allowed());
        assert!(!can_delete_task(&principal(2), &b, &t).is_allowed());
    }

    #[test]
    fn task_read_and_update_follow_board_read() {
        let b = board(1, &[2]);
        assert!(can_read_task(&principal(2), &b).is_allowed());
        assert!(can_update_task(&principal(2), &b).is_allowed());
        assert!(!can_read_task(&principal(3), &b).is_allowed());
        assert!(!can_update_task(&principal(3), &b).is_allowed());
    }

    #[test]
    fn assignee_must_be_a_member() {
        let b = board(1, &[2]);
        assert!(can_assign_task(&principal(1), &b, UserId(2)).is_allowed());
        assert_eq!(
            can_assign_task(&principal(1), &b, UserId(5)),
            Decision::Deny("assignee not a board member")
        );
    }

    #[test]
    fn assigning_requires_access_before_assignee_check() {
        let b = board(1, &[2]);
        assert_eq!(
            can_assign_task(&principal(4), &b, UserId(5)),
            Decision::Deny("not a member of this board")
        );
    }

    #[test]
    fn listing_users_is_admin_only() {
        assert!(can_list_all_users(&admin(1)).is_allowed());
        assert!(!can_list_all_users(&principal(1)).is_allowed());
    }

    #[test]
    fn reading_a_user_is_self_or_admin() {
        let target = user(5, Role::User);
        assert!(can_read_user(&principal(5), &target).is_allowed());
        assert!(can_read_user(&admin(1), &target).is_allowed());
        assert!(!can_read_user(&principal(6), &target).is_allowed());
    }

    #[test]
    fn mutating_a_user_is_self_only_without_admin_override() {
        let target = user(5, Role::User);
        assert!(can_mutate_user(&principal(5), &target).is_allowed());
        assert!(!can_mutate_user(&admin(1), &target).is_allowed());
    }

    #[test]
    fn same_username_with_different_id_is_not_the_same_identity() {
        let target = user(5, Role::User);
        let mut impostor = user(6, Role::User);
        impostor.username = target.username.clone();
        assert!(!can_mutate_user(&Principal::from(&impostor), &target).is_allowed());
    }

    #[test]
    fn deny_converts_into_error_with_reason() {
        assert_eq!(Decision::Allow.ensure(), Ok(()));
        assert_eq!(Decision::Deny("nope").ensure(), Err(Denied("nope")));
    }
}
