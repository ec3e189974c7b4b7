//! Family roster.
//!
//! Families and their members are owned by another service; the chat server
//! only reads them to scope every query and to resolve display names. The
//! roster is loaded once at startup from a JSON file and cached in a DashMap.
//!
//! ```json
//! { "members": [ { "userId": "u1", "familyId": "f1", "name": "Ana", "role": "member" } ] }
//! ```

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::conversation::CONVERSATION_SEPARATOR;
use crate::error::{ChatError, Result};

/// A member's role inside their family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    /// May purge messages outright.
    Moderator,
}

/// An authenticated user, resolved against the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub family_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }
}

/// The only user fields ever sent to other clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    members: Vec<Identity>,
}

/// Read-only roster cache: user id → identity.
#[derive(Clone, Default)]
pub struct Directory {
    members: Arc<DashMap<String, Identity>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the roster from a JSON file. Returns the number of members loaded.
    pub fn load_from_file(&self, path: &Path) -> Result<usize> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Directory(format!("failed to read {}: {}", path.display(), e))
        })?;
        let roster: RosterFile = serde_json::from_str(&contents).map_err(|e| {
            ChatError::Directory(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let count = roster.members.len();
        for member in roster.members {
            self.upsert(member)?;
        }

        tracing::info!(count = count, path = %path.display(), "Family roster loaded");
        Ok(count)
    }

    /// Insert or replace a member.
    ///
    /// User ids may not contain the conversation key separator, so every
    /// key maps back to exactly one pair of users.
    pub fn upsert(&self, identity: Identity) -> Result<()> {
        if identity.user_id.is_empty() || identity.user_id.contains(CONVERSATION_SEPARATOR) {
            return Err(ChatError::Directory(format!(
                "invalid user id '{}': must be non-empty and must not contain '{}'",
                identity.user_id, CONVERSATION_SEPARATOR
            )));
        }
        self.members.insert(identity.user_id.clone(), identity);
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> Option<Identity> {
        self.members.get(user_id).map(|m| m.clone())
    }

    /// Look up `user_id` only if they belong to `family_id`.
    ///
    /// A user from another family is indistinguishable from one that
    /// doesn't exist.
    pub fn member_of(&self, family_id: &str, user_id: &str) -> Option<Identity> {
        self.get(user_id).filter(|m| m.family_id == family_id)
    }

    pub fn display_name(&self, user_id: &str) -> String {
        self.get(user_id)
            .map(|m| m.display_name)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn summary(&self, user_id: &str) -> UserSummary {
        UserSummary {
            id: user_id.to_string(),
            name: self.display_name(user_id),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
