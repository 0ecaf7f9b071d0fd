//! Persistence behind narrow async traits.
//!
//! [`Repository`] is the generic capability every resource needs. [`UserStore`] adds the
//! credential lifecycle operations the auth service relies on; the ones touching
//! one-time tokens are single conditional writes so concurrent requests cannot
//! redeem a token twice or race past the resend cool-down.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::resource::{ListSpec, Resource};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Repository<R: Resource>: Send + Sync {
    async fn create(&self, draft: R::Draft) -> Result<R, AppError>;

    async fn find_by_id(&self, id: Uuid, scope: Option<Uuid>) -> Result<Option<R>, AppError>;

    async fn find_and_update(
        &self,
        id: Uuid,
        scope: Option<Uuid>,
        patch: R::Patch,
    ) -> Result<Option<R>, AppError>;

    /// Returns `false` when nothing in scope had that id.
    async fn find_and_delete(&self, id: Uuid, scope: Option<Uuid>) -> Result<bool, AppError>;

    async fn query(&self, scope: Option<Uuid>, spec: &ListSpec) -> Result<Vec<R>, AppError>;
}

/// Which one-time token slot of a user record an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Verification,
    PasswordReset,
}

/// Outcome of [`UserStore::issue_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenIssue {
    /// The new digest replaced whatever was pending.
    Issued,
    /// A token is pending and still has more life left than the resend window allows.
    Pending { expires_at: DateTime<Utc> },
    /// No user with that id.
    Missing,
}

#[async_trait]
pub trait UserStore: Repository<User> {
    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Replaces the password hash and stamps `password_changed_at`.
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;

    /// Stores a new token digest for `purpose`, but only if no token is pending or the
    /// pending one expires at or before `reissue_after`. Check and write are one step.
    async fn issue_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        digest: &str,
        expires_at: DateTime<Utc>,
        reissue_after: DateTime<Utc>,
    ) -> Result<TokenIssue, AppError>;

    /// Marks the account verified and clears the verification token, provided `digest`
    /// matches a pending token that has not expired at `now`.
    async fn redeem_verification(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;

    /// Sets a new password and clears the reset token, provided `digest` matches a
    /// pending token that has not expired at `now`.
    async fn redeem_reset(
        &self,
        digest: &str,
        now: DateTime<Utc>,
        password_hash: &str,
    ) -> Result<Option<User>, AppError>;
}
