use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use lsnp_core::UserId;

struct Group {
    name: String,
    members: HashSet<UserId>,
}

/// Local view of every group this peer knows about, keyed by GROUP_ID.
/// Membership is whatever the last GROUP_CREATE/GROUP_UPDATE said it was —
/// there is no quorum or conflict resolution across peers.
#[derive(Default)]
pub struct GroupState {
    groups: Mutex<HashMap<String, Group>>,
}

impl GroupState {
    pub fn new() -> Self {
        GroupState::default()
    }

    pub fn create(&self, group_id: &str, name: &str, members: impl IntoIterator<Item = UserId>) {
        self.groups.lock().insert(
            group_id.to_string(),
            Group {
                name: name.to_string(),
                members: members.into_iter().collect(),
            },
        );
    }

    /// Add then remove members from an existing group. Creates the group
    /// with an empty name if `GROUP_UPDATE` arrives before `GROUP_CREATE`.
    pub fn update(
        &self,
        group_id: &str,
        add: impl IntoIterator<Item = UserId>,
        remove: impl IntoIterator<Item = UserId>,
    ) {
        let mut groups = self.groups.lock();
        let group = groups.entry(group_id.to_string()).or_insert_with(|| Group {
            name: String::new(),
            members: HashSet::new(),
        });
        for m in add {
            group.members.insert(m);
        }
        for m in remove {
            group.members.remove(&m);
        }
    }

    pub fn members(&self, group_id: &str) -> Vec<UserId> {
        self.groups
            .lock()
            .get(group_id)
            .map(|g| g.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, group_id: &str, user_id: &UserId) -> bool {
        self.groups
            .lock()
            .get(group_id)
            .map(|g| g.members.contains(user_id))
            .unwrap_or(false)
    }

    pub fn name_of(&self, group_id: &str) -> Option<String> {
        self.groups.lock().get(group_id).map(|g| g.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_members_round_trips() {
        let gs = GroupState::new();
        let a = UserId::from("a@1.1.1.1");
        let b = UserId::from("b@1.1.1.2");
        gs.create("g1", "Friends", vec![a.clone(), b.clone()]);
        let mut members = gs.members("g1");
        members.sort();
        assert_eq!(members, vec![a, b]);
        assert_eq!(gs.name_of("g1"), Some("Friends".to_string()));
    }

    #[test]
    fn update_adds_and_removes_members() {
        let gs = GroupState::new();
        let a = UserId::from("a@1.1.1.1");
        let b = UserId::from("b@1.1.1.2");
        gs.create("g1", "Friends", vec![a.clone()]);
        gs.update("g1", vec![b.clone()], vec![a.clone()]);
        assert_eq!(gs.members("g1"), vec![b.clone()]);
        assert!(!gs.is_member("g1", &a));
        assert!(gs.is_member("g1", &b));
    }

    #[test]
    fn update_before_create_synthesizes_empty_named_group() {
        let gs = GroupState::new();
        let a = UserId::from("a@1.1.1.1");
        gs.update("g2", vec![a.clone()], vec![]);
        assert_eq!(gs.members("g2"), vec![a]);
        assert_eq!(gs.name_of("g2"), Some(String::new()));
    }
}
