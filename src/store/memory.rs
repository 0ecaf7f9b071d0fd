//! Process-local store with the same semantics as the Postgres one.
//!
//! Used by the test suites and by `STORE=memory` runs. Every conditional update happens
//! under a single write lock, which gives the same at-most-once guarantees as the
//! conditional `UPDATE` statements in [`PgStore`](crate::store::PgStore).
//! Lock order is always users before tasks.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewTask, NewUser, ProfileUpdate, Task, TaskPatch, User};
use crate::resource::{ListSpec, Resource};
use crate::store::{Repository, TokenIssue, TokenPurpose, UserStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, AppError> {
    lock.read()
        .map_err(|_| AppError::InternalServerError("memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, AppError> {
    lock.write()
        .map_err(|_| AppError::InternalServerError("memory store lock poisoned".into()))
}

fn in_scope<R: Resource>(item: &R, scope: Option<Uuid>) -> bool {
    scope.map_or(true, |owner| item.scope_id() == owner)
}

fn title_taken(tasks: &HashMap<Uuid, Task>, user_id: Uuid, title: &str, except: Option<Uuid>) -> bool {
    tasks
        .values()
        .any(|t| t.user_id == user_id && t.title == title && Some(t.id) != except)
}

#[async_trait]
impl Repository<User> for MemoryStore {
    async fn create(&self, draft: NewUser) -> Result<User, AppError> {
        let mut users = write(&self.users)?;
        if users.values().any(|u| u.email == draft.email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        let user = User::from_new(draft);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid, scope: Option<Uuid>) -> Result<Option<User>, AppError> {
        let users = read(&self.users)?;
        Ok(users.get(&id).filter(|u| in_scope(*u, scope)).cloned())
    }

    async fn find_and_update(
        &self,
        id: Uuid,
        scope: Option<Uuid>,
        patch: ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let mut users = write(&self.users)?;
        match users.get_mut(&id).filter(|u| in_scope(&**u, scope)) {
            Some(user) => {
                user.apply(patch);
                Ok(Some(user.clone()))
            }
            None => Ok(None),
        }
    }

    async fn find_and_delete(&self, id: Uuid, scope: Option<Uuid>) -> Result<bool, AppError> {
        let mut users = write(&self.users)?;
        if !users.get(&id).map_or(false, |u| in_scope(u, scope)) {
            return Ok(false);
        }
        users.remove(&id);
        write(&self.tasks)?.retain(|_, task| task.user_id != id);
        Ok(true)
    }

    async fn query(&self, scope: Option<Uuid>, spec: &ListSpec) -> Result<Vec<User>, AppError> {
        let users = read(&self.users)?;
        Ok(spec.apply(users.values().filter(|u| in_scope(*u, scope)).cloned()))
    }
}

#[async_trait]
impl Repository<Task> for MemoryStore {
    async fn create(&self, draft: NewTask) -> Result<Task, AppError> {
        let users = read(&self.users)?;
        if !users.contains_key(&draft.user_id) {
            return Err(AppError::NotFound("Task owner not found".into()));
        }
        let mut tasks = write(&self.tasks)?;
        if title_taken(&tasks, draft.user_id, &draft.title, None) {
            return Err(AppError::Conflict("A task with this title already exists".into()));
        }
        let task = Task::new(draft);
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: Uuid, scope: Option<Uuid>) -> Result<Option<Task>, AppError> {
        let tasks = read(&self.tasks)?;
        Ok(tasks.get(&id).filter(|t| in_scope(*t, scope)).cloned())
    }

    async fn find_and_update(
        &self,
        id: Uuid,
        scope: Option<Uuid>,
        patch: TaskPatch,
    ) -> Result<Option<Task>, AppError> {
        let mut tasks = write(&self.tasks)?;
        let owner = match tasks.get(&id).filter(|t| in_scope(*t, scope)) {
            Some(task) => task.user_id,
            None => return Ok(None),
        };
        if let Some(title) = &patch.title {
            if title_taken(&tasks, owner, title.trim(), Some(id)) {
                return Err(AppError::Conflict("A task with this title already exists".into()));
            }
        }
        Ok(tasks.get_mut(&id).map(|task| {
            task.apply(patch);
            task.clone()
        }))
    }

    async fn find_and_delete(&self, id: Uuid, scope: Option<Uuid>) -> Result<bool, AppError> {
        let mut tasks = write(&self.tasks)?;
        if !tasks.get(&id).map_or(false, |t| in_scope(t, scope)) {
            return Ok(false);
        }
        tasks.remove(&id);
        Ok(true)
    }

    async fn query(&self, scope: Option<Uuid>, spec: &ListSpec) -> Result<Vec<Task>, AppError> {
        let tasks = read(&self.tasks)?;
        Ok(spec.apply(tasks.values().filter(|t| in_scope(*t, scope)).cloned()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = read(&self.users)?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let mut users = write(&self.users)?;
        Ok(users.get_mut(&id).map(|user| {
            user.password_hash = password_hash.to_string();
            user.password_changed_at = Some(changed_at);
            user.updated_at = changed_at;
            user.clone()
        }))
    }

    async fn issue_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        digest: &str,
        expires_at: DateTime<Utc>,
        reissue_after: DateTime<Utc>,
    ) -> Result<TokenIssue, AppError> {
        let mut users = write(&self.users)?;
        let user = match users.get_mut(&id) {
            Some(user) => user,
            None => return Ok(TokenIssue::Missing),
        };
        let (token, expiry) = match purpose {
            TokenPurpose::Verification => (
                &mut user.verification_token,
                &mut user.verification_expires_at,
            ),
            TokenPurpose::PasswordReset => (&mut user.reset_token, &mut user.reset_expires_at),
        };
        if let Some(pending) = *expiry {
            if pending > reissue_after {
                return Ok(TokenIssue::Pending {
                    expires_at: pending,
                });
            }
        }
        *token = Some(digest.to_string());
        *expiry = Some(expires_at);
        Ok(TokenIssue::Issued)
    }

    async fn redeem_verification(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let mut users = write(&self.users)?;
        let user = users.values_mut().find(|u| {
            u.verification_token.as_deref() == Some(digest)
                && u.verification_expires_at.map_or(false, |exp| exp > now)
        });
        Ok(user.map(|user| {
            user.verification_token = None;
            user.verification_expires_at = None;
            user.verified = true;
            user.updated_at = now;
            user.clone()
        }))
    }

    async fn redeem_reset(
        &self,
        digest: &str,
        now: DateTime<Utc>,
        password_hash: &str,
    ) -> Result<Option<User>, AppError> {
        let mut users = write(&self.users)?;
        let user = users.values_mut().find(|u| {
            u.reset_token.as_deref() == Some(digest)
                && u.reset_expires_at.map_or(false, |exp| exp > now)
        });
        Ok(user.map(|user| {
            user.reset_token = None;
            user.reset_expires_at = None;
            user.password_hash = password_hash.to_string();
            user.password_changed_at = Some(now);
            user.updated_at = now;
            user.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, PendingToken, Role, TaskPriority, TaskStatus};
    use chrono::Duration;

    fn new_user(email: &str, verification: Option<PendingToken>) -> NewUser {
        NewUser {
            name: "Test User".into(),
            email: email.into(),
            gender: Gender::Other,
            country: "Nowhere".into(),
            image: None,
            role: Role::User,
            verified: false,
            password_hash: "hash".into(),
            verification,
        }
    }

    fn new_task(owner: Uuid, title: &str) -> NewTask {
        NewTask {
            user_id: owner,
            title: title.into(),
            description: "d".into(),
            date: Utc::now(),
            priority: TaskPriority::Medium,
            status: TaskStatus::InProgress,
        }
    }

    #[actix_rt::test]
    async fn test_email_is_unique() {
        let store = MemoryStore::new();
        Repository::<User>::create(&store, new_user("a@x.com", None)).await.unwrap();
        let err = Repository::<User>::create(&store, new_user("a@x.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[actix_rt::test]
    async fn test_verification_token_redeems_once() {
        let store = MemoryStore::new();
        let pending = PendingToken {
            digest: "digest-1".into(),
            expires_at: Utc::now() + Duration::minutes(10),
        };
        let user = Repository::<User>::create(&store, new_user("a@x.com", Some(pending)))
            .await
            .unwrap();

        let redeemed = store
            .redeem_verification("digest-1", Utc::now())
            .await
            .unwrap()
            .expect("first redemption succeeds");
        assert_eq!(redeemed.id, user.id);
        assert!(redeemed.verified);
        assert!(redeemed.verification_token.is_none());
        assert!(redeemed.verification_expires_at.is_none());

        assert!(store
            .redeem_verification("digest-1", Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[actix_rt::test]
    async fn test_expired_token_is_not_redeemed() {
        let store = MemoryStore::new();
        let pending = PendingToken {
            digest: "digest-1".into(),
            expires_at: Utc::now() + Duration::minutes(10),
        };
        Repository::<User>::create(&store, new_user("a@x.com", Some(pending)))
            .await
            .unwrap();

        let later = Utc::now() + Duration::minutes(11);
        assert!(store
            .redeem_verification("digest-1", later)
            .await
            .unwrap()
            .is_none());
    }

    #[actix_rt::test]
    async fn test_expired_reset_token_leaves_password_alone() {
        let store = MemoryStore::new();
        let user = Repository::<User>::create(&store, new_user("a@x.com", None)).await.unwrap();
        let now = Utc::now();
        let expires = now + Duration::minutes(10);
        store
            .issue_token(user.id, TokenPurpose::PasswordReset, "r1", expires, now)
            .await
            .unwrap();

        assert!(store.redeem_reset("r1", expires, "new").await.unwrap().is_none());
        assert!(store
            .redeem_reset("r1", expires + Duration::seconds(1), "new")
            .await
            .unwrap()
            .is_none());

        let unchanged = Repository::<User>::find_by_id(&store, user.id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.password_hash, user.password_hash);
        assert!(unchanged.password_changed_at.is_none());
        assert_eq!(unchanged.reset_token.as_deref(), Some("r1"));
    }

    #[actix_rt::test]
    async fn test_task_needs_an_existing_owner() {
        let store = MemoryStore::new();
        let err = Repository::<Task>::create(&store, new_task(Uuid::new_v4(), "Orphan"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.tasks.read().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_issue_token_respects_cool_down() {
        let store = MemoryStore::new();
        let user = Repository::<User>::create(&store, new_user("a@x.com", None)).await.unwrap();
        let now = Utc::now();
        let expires = now + Duration::minutes(10);
        let gate = now + Duration::seconds(210);

        let first = store
            .issue_token(user.id, TokenPurpose::PasswordReset, "d1", expires, gate)
            .await
            .unwrap();
        assert_eq!(first, TokenIssue::Issued);

        let second = store
            .issue_token(user.id, TokenPurpose::PasswordReset, "d2", expires, gate)
            .await
            .unwrap();
        assert_eq!(second, TokenIssue::Pending { expires_at: expires });

        // Seven minutes on, less than the window of life is left
        let later = now + Duration::minutes(7);
        let third = store
            .issue_token(
                user.id,
                TokenPurpose::PasswordReset,
                "d3",
                later + Duration::minutes(10),
                later + Duration::seconds(210),
            )
            .await
            .unwrap();
        assert_eq!(third, TokenIssue::Issued);

        assert!(store.redeem_reset("d1", later, "new").await.unwrap().is_none());
        let reset = store
            .redeem_reset("d3", later, "new")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reset.password_hash, "new");
        assert_eq!(reset.password_changed_at, Some(later));

        let missing = store
            .issue_token(Uuid::new_v4(), TokenPurpose::Verification, "d", expires, gate)
            .await
            .unwrap();
        assert_eq!(missing, TokenIssue::Missing);
    }

    #[actix_rt::test]
    async fn test_task_scope_and_cascade() {
        let store = MemoryStore::new();
        let alice = Repository::<User>::create(&store, new_user("alice@x.com", None)).await.unwrap();
        let bob = Repository::<User>::create(&store, new_user("bob@x.com", None)).await.unwrap();
        let task = Repository::<Task>::create(&store, new_task(alice.id, "Groceries")).await.unwrap();

        assert!(Repository::<Task>::find_by_id(&store, task.id, Some(bob.id))
            .await
            .unwrap()
            .is_none());
        assert!(!Repository::<Task>::find_and_delete(&store, task.id, Some(bob.id))
            .await
            .unwrap());
        let err = Repository::<Task>::create(&store, new_task(alice.id, "Groceries"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // Titles only need to be unique per owner
        Repository::<Task>::create(&store, new_task(bob.id, "Groceries")).await.unwrap();

        assert!(Repository::<User>::find_and_delete(&store, alice.id, None)
            .await
            .unwrap());
        assert!(Repository::<Task>::find_by_id(&store, task.id, None)
            .await
            .unwrap()
            .is_none());
    }
}
