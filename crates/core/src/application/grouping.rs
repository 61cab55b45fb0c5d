// In-memory build-affinity group table
//
// Single source of truth for grouping decisions. Owned jointly by the
// scheduler tick and completion handling; one async mutex serializes every
// mutation, as the two paths run on different tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{AffinityGroup, GroupKey};

pub type SharedGroupTable = Arc<Mutex<GroupTable>>;

pub fn shared_group_table() -> SharedGroupTable {
    Arc::new(Mutex::new(GroupTable::new()))
}

/// Groups keyed by `(agent_id, build)`, ordered for deterministic walks
#[derive(Default)]
pub struct GroupTable {
    groups: BTreeMap<GroupKey, AffinityGroup>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: GroupKey, group: AffinityGroup) {
        self.groups.insert(key, group);
    }

    pub fn get(&self, key: &GroupKey) -> Option<&AffinityGroup> {
        self.groups.get(key)
    }

    pub fn get_mut(&mut self, key: &GroupKey) -> Option<&mut AffinityGroup> {
        self.groups.get_mut(key)
    }

    pub fn remove(&mut self, key: &GroupKey) -> Option<AffinityGroup> {
        self.groups.remove(key)
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.groups.contains_key(key)
    }

    /// Every group holding the given build, in key order. Several agents may
    /// each be working the same build; attach decisions must consider all of
    /// them.
    pub fn groups_for_build(&self, build: &str) -> Vec<GroupKey> {
        self.groups
            .keys()
            .filter(|k| k.build == build)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &AffinityGroup)> {
        self.groups.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&GroupKey, &mut AffinityGroup)> {
        self.groups.iter_mut()
    }

    /// Remove and return every non-processing group older than `max_idle_ms`
    pub fn take_expired(&mut self, now: i64, max_idle_ms: i64) -> Vec<(GroupKey, AffinityGroup)> {
        let expired: Vec<GroupKey> = self
            .groups
            .iter()
            .filter(|(_, g)| !g.processing && g.age_ms(now) > max_idle_ms)
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|k| self.groups.remove(&k).map(|g| (k, g)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_for_build_lists_every_match_in_key_order() {
        let mut table = GroupTable::new();
        table.insert(
            GroupKey::new("b-agent", "build-1"),
            AffinityGroup::new("j-2".to_string(), 0),
        );
        table.insert(
            GroupKey::new("a-agent", "build-1"),
            AffinityGroup::new("j-1".to_string(), 0),
        );
        table.insert(
            GroupKey::new("c-agent", "build-2"),
            AffinityGroup::new("j-3".to_string(), 0),
        );
        let keys = table.groups_for_build("build-1");
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].agent_id, "a-agent");
        assert_eq!(keys[1].agent_id, "b-agent");
        assert!(table.groups_for_build("build-9").is_empty());
    }

    #[test]
    fn take_expired_skips_processing_groups() {
        let mut table = GroupTable::new();
        let mut stale = AffinityGroup::new("j-1".to_string(), 0);
        stale.processing = false;
        table.insert(GroupKey::new("a", "b-1"), stale);
        table.insert(
            GroupKey::new("a", "b-2"),
            AffinityGroup::new("j-2".to_string(), 0),
        );

        let expired = table.take_expired(700_000, 600_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0.build, "b-1");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn take_expired_honours_age_threshold() {
        let mut table = GroupTable::new();
        let mut fresh = AffinityGroup::new("j-1".to_string(), 500_000);
        fresh.processing = false;
        table.insert(GroupKey::new("a", "b-1"), fresh);
        assert!(table.take_expired(700_000, 600_000).is_empty());
    }
}
