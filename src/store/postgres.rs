use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewTask, NewUser, ProfileUpdate, Task, TaskPatch, User};
use crate::resource::{ListSpec, Resource};
use crate::store::{Repository, TokenIssue, TokenPurpose, UserStore};

/// Postgres-backed store. Uniqueness, ownership cascade and the one-time token
/// conditions are enforced by the schema in `migrations/` and by conditional writes.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        log::info!("Database migrations applied");
        Ok(Self::new(pool))
    }
}

fn push_scope<R: Resource>(builder: &mut QueryBuilder<'_, Postgres>, scope: Option<Uuid>) {
    if let Some(owner) = scope {
        builder.push(format!(" AND {} = ", R::SCOPE_COLUMN));
        builder.push_bind(owner);
    }
}

async fn fetch_scoped<R>(pool: &PgPool, id: Uuid, scope: Option<Uuid>) -> Result<Option<R>, AppError>
where
    R: Resource + for<'r> FromRow<'r, PgRow> + Unpin,
{
    let mut builder = QueryBuilder::new(format!("SELECT * FROM {} WHERE id = ", R::TABLE));
    builder.push_bind(id);
    push_scope::<R>(&mut builder, scope);
    Ok(builder.build_query_as::<R>().fetch_optional(pool).await?)
}

async fn delete_scoped<R: Resource>(
    pool: &PgPool,
    id: Uuid,
    scope: Option<Uuid>,
) -> Result<bool, AppError> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {} WHERE id = ", R::TABLE));
    builder.push_bind(id);
    push_scope::<R>(&mut builder, scope);
    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Equality filters compare against the column's text form so enum and boolean
/// columns accept their wire names. Ties are broken by id for stable paging.
async fn list<R>(pool: &PgPool, scope: Option<Uuid>, spec: &ListSpec) -> Result<Vec<R>, AppError>
where
    R: Resource + for<'r> FromRow<'r, PgRow> + Unpin,
{
    let mut builder = QueryBuilder::new(format!("SELECT * FROM {} WHERE TRUE", R::TABLE));
    push_scope::<R>(&mut builder, scope);
    for (field, value) in &spec.filters {
        builder.push(format!(" AND {}::text = ", field.column));
        builder.push_bind(value.clone());
    }
    builder.push(" ORDER BY ");
    for (field, order) in &spec.sort {
        builder.push(format!("{} {}, ", field.column, order.as_sql()));
    }
    builder.push("id ASC LIMIT ");
    builder.push_bind(spec.limit as i64);
    builder.push(" OFFSET ");
    builder.push_bind(spec.offset() as i64);

    Ok(builder.build_query_as::<R>().fetch_all(pool).await?)
}

#[async_trait]
impl Repository<User> for PgStore {
    async fn create(&self, draft: NewUser) -> Result<User, AppError> {
        let user = User::from_new(draft);
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, name, email, gender, country, image, role, verified, \
             password_hash, verification_token, verification_expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.gender)
        .bind(&user.country)
        .bind(&user.image)
        .bind(user.role)
        .bind(user.verified)
        .bind(&user.password_hash)
        .bind(&user.verification_token)
        .bind(user.verification_expires_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid, scope: Option<Uuid>) -> Result<Option<User>, AppError> {
        fetch_scoped(&self.pool, id, scope).await
    }

    async fn find_and_update(
        &self,
        id: Uuid,
        scope: Option<Uuid>,
        patch: ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET name = COALESCE($3, name), gender = COALESCE($4, gender), \
             country = COALESCE($5, country), image = COALESCE($6, image), updated_at = NOW() \
             WHERE id = $1 AND ($2::uuid IS NULL OR id = $2) RETURNING *",
        )
        .bind(id)
        .bind(scope)
        .bind(patch.name.map(|name| name.trim().to_string()))
        .bind(patch.gender)
        .bind(patch.country.map(|country| country.trim().to_string()))
        .bind(patch.image)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_and_delete(&self, id: Uuid, scope: Option<Uuid>) -> Result<bool, AppError> {
        delete_scoped::<User>(&self.pool, id, scope).await
    }

    async fn query(&self, scope: Option<Uuid>, spec: &ListSpec) -> Result<Vec<User>, AppError> {
        list(&self.pool, scope, spec).await
    }
}

#[async_trait]
impl Repository<Task> for PgStore {
    async fn create(&self, draft: NewTask) -> Result<Task, AppError> {
        let task = Task::new(draft);
        let task = sqlx::query_as::<_, Task>(
            "INSERT INTO tasks (id, title, description, date, priority, status, user_id, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.date)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.user_id)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find_by_id(&self, id: Uuid, scope: Option<Uuid>) -> Result<Option<Task>, AppError> {
        fetch_scoped(&self.pool, id, scope).await
    }

    async fn find_and_update(
        &self,
        id: Uuid,
        scope: Option<Uuid>,
        patch: TaskPatch,
    ) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as::<_, Task>(
            "UPDATE tasks SET title = COALESCE($3, title), \
             description = COALESCE($4, description), date = COALESCE($5, date), \
             priority = COALESCE($6, priority), status = COALESCE($7, status), \
             updated_at = NOW() \
             WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2) RETURNING *",
        )
        .bind(id)
        .bind(scope)
        .bind(patch.title.map(|title| title.trim().to_string()))
        .bind(patch.description.map(|description| description.trim().to_string()))
        .bind(patch.date)
        .bind(patch.priority)
        .bind(patch.status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find_and_delete(&self, id: Uuid, scope: Option<Uuid>) -> Result<bool, AppError> {
        delete_scoped::<Task>(&self.pool, id, scope).await
    }

    async fn query(&self, scope: Option<Uuid>, spec: &ListSpec) -> Result<Vec<Task>, AppError> {
        list(&self.pool, scope, spec).await
    }
}

fn token_columns(purpose: TokenPurpose) -> (&'static str, &'static str) {
    match purpose {
        TokenPurpose::Verification => ("verification_token", "verification_expires_at"),
        TokenPurpose::PasswordReset => ("reset_token", "reset_expires_at"),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET password_hash = $2, password_changed_at = $3, updated_at = $3 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn issue_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        digest: &str,
        expires_at: DateTime<Utc>,
        reissue_after: DateTime<Utc>,
    ) -> Result<TokenIssue, AppError> {
        let (token, expiry) = token_columns(purpose);
        // The row lock taken by the CTE serializes concurrent resends for one user
        let sql = format!(
            "WITH target AS (SELECT id, {expiry} AS pending FROM users WHERE id = $1 FOR UPDATE), \
             updated AS (UPDATE users SET {token} = $2, {expiry} = $3, updated_at = NOW() \
             FROM target WHERE users.id = target.id \
             AND (target.pending IS NULL OR target.pending <= $4) RETURNING users.id) \
             SELECT target.pending, EXISTS (SELECT 1 FROM updated) AS issued FROM target",
            token = token,
            expiry = expiry,
        );
        let row: Option<(Option<DateTime<Utc>>, bool)> = sqlx::query_as(&sql)
            .bind(id)
            .bind(digest)
            .bind(expires_at)
            .bind(reissue_after)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            None => TokenIssue::Missing,
            Some((_, true)) => TokenIssue::Issued,
            Some((Some(pending), false)) => TokenIssue::Pending {
                expires_at: pending,
            },
            Some((None, false)) => {
                return Err(AppError::DatabaseError(
                    "token issue skipped without a pending token".into(),
                ))
            }
        })
    }

    async fn redeem_verification(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET verified = TRUE, verification_token = NULL, \
             verification_expires_at = NULL, updated_at = $2 \
             WHERE verification_token = $1 AND verification_expires_at > $2 RETURNING *",
        )
        .bind(digest)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn redeem_reset(
        &self,
        digest: &str,
        now: DateTime<Utc>,
        password_hash: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET password_hash = $3, password_changed_at = $2, \
             reset_token = NULL, reset_expires_at = NULL, updated_at = $2 \
             WHERE reset_token = $1 AND reset_expires_at > $2 RETURNING *",
        )
        .bind(digest)
        .bind(now)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
