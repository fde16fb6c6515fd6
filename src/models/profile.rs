use serde::{Deserialize, Serialize};

use super::UserId;

/// Stored profile row. `role` stays a raw string here; see [`super::Role::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub role: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub id: UserId,
    pub role: &'static str,
    pub display_name: Option<String>,
}
