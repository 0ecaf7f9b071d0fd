pub mod task;
pub mod user;

/// Deserializers that trim surrounding whitespace, so length rules are checked
/// against the value that gets stored.
pub mod trimmed {
    use serde::{Deserialize, Deserializer};

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(|value| value.trim().to_string())
    }

    /// For optional fields; pair with `#[serde(default)]`.
    pub fn option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)
            .map(|value| value.map(|value| value.trim().to_string()))
    }
}

pub use task::{NewTask, Task, TaskInput, TaskPatch, TaskPriority, TaskStatus};
pub use user::{Gender, NewUser, PendingToken, ProfileUpdate, Role, User};
