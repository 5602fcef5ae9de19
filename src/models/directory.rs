use serde::{Deserialize, Serialize};

/// One entry of the user list served by the recipient directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,

    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub email: String,
}

impl DirectoryUser {
    pub fn display_name(&self) -> &str {
        if !self.username.is_empty() {
            &self.username
        } else if !self.email.is_empty() {
            &self.email
        } else {
            &self.id
        }
    }
}

pub fn elevated_recipients(users: &[DirectoryUser], role: &str) -> Vec<String> {
    users
        .iter()
        .filter(|user| user.role == role)
        .map(|user| user.id.clone())
        .collect()
}

/// Falls back to the raw id when the actor is not listed.
pub fn resolve_display_name(users: &[DirectoryUser], user_id: &str) -> String {
    if user_id.is_empty() {
        return "Unknown User".to_string();
    }

    users
        .iter()
        .find(|user| user.id == user_id)
        .map(|user| user.display_name().to_string())
        .unwrap_or_else(|| user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: &str, username: &str, email: &str) -> DirectoryUser {
        DirectoryUser {
            id: id.to_string(),
            role: role.to_string(),
            username: username.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn selects_users_with_the_elevated_role() {
        let users = vec![
            user("a1", "admin", "root", ""),
            user("u1", "user", "alice", ""),
            user("a2", "admin", "", "ops@example.com"),
        ];

        assert_eq!(elevated_recipients(&users, "admin"), vec!["a1", "a2"]);
    }

    #[test]
    fn display_name_prefers_username_then_email_then_id() {
        let users = vec![
            user("u1", "user", "alice", "alice@example.com"),
            user("u2", "user", "", "bob@example.com"),
        ];

        assert_eq!(resolve_display_name(&users, "u1"), "alice");
        assert_eq!(resolve_display_name(&users, "u2"), "bob@example.com");
        assert_eq!(resolve_display_name(&users, "u9"), "u9");
        assert_eq!(resolve_display_name(&users, ""), "Unknown User");
    }
}
