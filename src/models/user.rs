use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::resource::{Field, Resource, SortKey};
use crate::state::AppState;
use crate::store::Repository;

lazy_static! {
    // Letters first, then letters, spaces, dots, apostrophes or hyphens
    pub static ref NAME_REGEX: Regex = Regex::new(r"^\p{L}[\p{L} .'-]*$").unwrap();
}

/// Account role. Corresponds to the `user_role` SQL enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Corresponds to the `gender` SQL enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

/// A user account as stored in the database.
///
/// Credential material (password hash, one-time token digests and their expiries,
/// the password change stamp) is never serialized.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub gender: Gender,
    pub country: String,
    pub image: Option<String>,
    pub role: Role,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub verification_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_new(new: NewUser) -> Self {
        let now = Utc::now();
        let (verification_token, verification_expires_at) = match new.verification {
            Some(pending) => (Some(pending.digest), Some(pending.expires_at)),
            None => (None, None),
        };
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            gender: new.gender,
            country: new.country,
            image: new.image,
            role: new.role,
            verified: new.verified,
            password_hash: new.password_hash,
            verification_token,
            verification_expires_at,
            reset_token: None,
            reset_expires_at: None,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the password was changed after a session token issued at
    /// `issued_at_micros` (microseconds since epoch), which makes that token stale.
    pub fn changed_password_after(&self, issued_at_micros: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.timestamp_micros() > issued_at_micros)
            .unwrap_or(false)
    }

    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(gender) = update.gender {
            self.gender = gender;
        }
        if let Some(country) = update.country {
            self.country = country.trim().to_string();
        }
        if let Some(image) = update.image {
            self.image = Some(image);
        }
        self.updated_at = Utc::now();
    }
}

/// Digest and expiry of a freshly issued one-time token.
#[derive(Debug, Clone)]
pub struct PendingToken {
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

/// Everything needed to insert a user. Built by the auth service, never by clients.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub gender: Gender,
    pub country: String,
    pub image: Option<String>,
    pub role: Role,
    pub verified: bool,
    pub password_hash: String,
    pub verification: Option<PendingToken>,
}

/// Profile fields a user may change on their own record.
///
/// Unknown fields (`email`, `password`, `role`, ...) are rejected at deserialization.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdate {
    #[serde(default, deserialize_with = "crate::models::trimmed::option")]
    #[validate(
        length(min = 1, max = 50),
        regex(path = "NAME_REGEX", message = "Name may only contain letters, spaces, dots, apostrophes or hyphens")
    )]
    pub name: Option<String>,
    pub gender: Option<Gender>,
    #[serde(default, deserialize_with = "crate::models::trimmed::option")]
    #[validate(length(min = 2, max = 56))]
    pub country: Option<String>,
    #[validate(length(max = 500))]
    pub image: Option<String>,
}

const USER_FIELDS: &[Field] = &[
    Field::new("name", "name").filterable().sortable(),
    Field::new("email", "email").filterable().sortable(),
    Field::new("role", "role").filterable().sortable(),
    Field::new("verified", "verified").filterable(),
    Field::new("gender", "gender").filterable(),
    Field::new("country", "country").filterable().sortable(),
    Field::new("createdAt", "created_at").sortable(),
];

impl Resource for User {
    type Draft = NewUser;
    type Patch = ProfileUpdate;

    const NAME: &'static str = "User";
    const TABLE: &'static str = "users";
    const SCOPE_COLUMN: &'static str = "id";
    const FIELDS: &'static [Field] = USER_FIELDS;
    const DEFAULT_SORT: &'static str = "-createdAt";

    fn id(&self) -> Uuid {
        self.id
    }

    fn scope_id(&self) -> Uuid {
        self.id
    }

    /// Admins reach every account, everyone else only their own.
    fn scope_for(actor: &CurrentUser) -> Option<Uuid> {
        match actor.role {
            Role::Admin => None,
            Role::User => Some(actor.id),
        }
    }

    fn filter_value(&self, field: &str) -> Option<String> {
        match field {
            "name" => Some(self.name.clone()),
            "email" => Some(self.email.clone()),
            "role" => Some(self.role.as_str().to_string()),
            "verified" => Some(self.verified.to_string()),
            "gender" => Some(self.gender.as_str().to_string()),
            "country" => Some(self.country.clone()),
            _ => None,
        }
    }

    fn sort_key(&self, field: &str) -> SortKey {
        match field {
            "name" => SortKey::Text(self.name.clone()),
            "email" => SortKey::Text(self.email.clone()),
            "role" => SortKey::Rank(self.role as u8),
            "country" => SortKey::Text(self.country.clone()),
            "createdAt" => SortKey::Time(self.created_at),
            _ => SortKey::Missing,
        }
    }

    fn repository(state: &AppState) -> &dyn Repository<Self> {
        state.users.as_ref()
    }
}
