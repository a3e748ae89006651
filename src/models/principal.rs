use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    SystemAdmin,
}

/// Server-verified caller identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    /// Gym the caller belongs to. System administrators may have none.
    pub gym_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Principal {
    pub fn is_system_admin(&self) -> bool {
        self.role == Role::SystemAdmin
    }

    pub fn can_access_gym(&self, gym_id: &str) -> bool {
        self.is_system_admin() || self.gym_id.as_deref() == Some(gym_id)
    }
}
