//! Roster of collaborators seen on the wire.
//!
//! Presence messages are ephemeral, so the roster is the only place a
//! front-end can look up who a `user_id` is. Entries are whatever peers
//! claim about themselves; nothing is authenticated.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::crdt::position::NodeId;

/// Fallback palette, assigned deterministically by node id so every replica
/// paints an unnamed collaborator the same way.
const FALLBACK_COLORS: &[&str] = &[
    "#FF5733", "#33FF57", "#3357FF", "#FF33F1", "#F1FF33", "#33FFF1", "#FF8C33", "#8C33FF",
    "#33FF8C", "#FF3333", "#33FFFF", "#FFFF33", "#8B4513", "#FF1493", "#00CED1", "#FFD700",
    "#32CD32", "#FF4500", "#9370DB", "#00FA9A", "#FF6347", "#4169E1", "#FF69B4", "#00BFFF",
];

/// Deterministic color for a node with no announced color.
pub fn fallback_color(id: NodeId) -> &'static str {
    FALLBACK_COLORS[(id.0 as usize) % FALLBACK_COLORS.len()]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: NodeId,
    pub name: String,
    pub color: String,
}

/// Mutable map of known collaborators, fed from presence events.
#[derive(Default)]
pub struct UserRegistry {
    users: Mutex<BTreeMap<NodeId, User>>,
}

impl UserRegistry {
    pub fn new() -> UserRegistry {
        UserRegistry::default()
    }

    /// Record (or refresh) a collaborator. Missing metadata falls back to a
    /// generated name and the deterministic palette; present metadata
    /// overwrites what we had.
    pub fn observe(&self, id: NodeId, name: Option<&str>, color: Option<&str>) -> User {
        let mut users = self.users.lock().expect("user registry lock poisoned");
        let entry = users.entry(id).or_insert_with(|| User {
            id,
            name: format!("user-{id}"),
            color: fallback_color(id).to_string(),
        });
        if let Some(name) = name {
            entry.name = name.to_string();
        }
        if let Some(color) = color {
            entry.color = color.to_string();
        }
        entry.clone()
    }

    pub fn get(&self, id: NodeId) -> Option<User> {
        self.users
            .lock()
            .expect("user registry lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn remove(&self, id: NodeId) -> Option<User> {
        self.users
            .lock()
            .expect("user registry lock poisoned")
            .remove(&id)
    }

    /// All known collaborators, ordered by node id.
    pub fn all(&self) -> Vec<User> {
        self.users
            .lock()
            .expect("user registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.lock().expect("user registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
