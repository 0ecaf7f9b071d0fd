//! Generic CRUD plumbing shared by every entity exposed over the API.
//!
//! An entity implements [`Resource`] to describe itself (table, filterable and sortable
//! fields, ownership scope) and gets list/read/update/delete handlers for free from
//! [`handlers`]. Entities that clients may create directly also implement [`Creatable`].
//! Persistence goes through the narrow [`Repository`](crate::store::Repository) trait.

pub mod handlers;
pub mod query;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::state::AppState;
use crate::store::Repository;

pub use query::{ListSpec, Order};

/// A field exposed to list queries, mapping its API name to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub column: &'static str,
    pub filter: bool,
    pub sort: bool,
}

impl Field {
    pub const fn new(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column,
            filter: false,
            sort: false,
        }
    }

    pub const fn filterable(self) -> Self {
        Self {
            filter: true,
            ..self
        }
    }

    pub const fn sortable(self) -> Self {
        Self { sort: true, ..self }
    }
}

/// In-memory ordering key for one field, mirroring how Postgres orders the column.
///
/// `Missing` sorts last, like NULLs under `ASC`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Rank(u8),
    Time(DateTime<Utc>),
    Text(String),
    Missing,
}

pub trait Resource: Serialize + Clone + Send + Sync + Sized + 'static {
    /// What a repository needs to insert a new record.
    type Draft: Send + 'static;
    /// Partial update accepted from clients.
    type Patch: DeserializeOwned + Validate + Send + 'static;

    /// Human readable name used in messages.
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Column compared against the scope returned by [`Resource::scope_for`].
    const SCOPE_COLUMN: &'static str;
    const FIELDS: &'static [Field];
    const DEFAULT_SORT: &'static str;

    fn id(&self) -> Uuid;

    /// Value of [`Resource::SCOPE_COLUMN`] for this record.
    fn scope_id(&self) -> Uuid;

    /// Restricts which records `actor` can reach. `None` means unrestricted.
    fn scope_for(actor: &CurrentUser) -> Option<Uuid>;

    /// Text form of a filterable field, matching the column's `::text` cast.
    fn filter_value(&self, field: &str) -> Option<String>;

    fn sort_key(&self, field: &str) -> SortKey;

    fn repository(state: &AppState) -> &dyn Repository<Self>;
}

/// A resource clients create directly through `POST`.
pub trait Creatable: Resource {
    type Input: DeserializeOwned + Validate + Send + 'static;

    fn draft(input: Self::Input, actor: &CurrentUser) -> Self::Draft;
}
