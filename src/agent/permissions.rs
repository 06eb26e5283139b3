//! Agent permissions: the set of actions an agent may perform.
//!
//! The kernel only answers the query; enforcement is up to each handler.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Set of allowed action names.
///
/// An empty set grants nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    allowed: HashSet<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self {
            allowed: HashSet::new(),
        }
    }

    /// Allow an action.
    pub fn grant(&mut self, action: &str) {
        self.allowed.insert(action.to_string());
    }

    /// Allow several actions at once.
    pub fn grant_many<I, S>(&mut self, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed.extend(actions.into_iter().map(Into::into));
    }

    /// Withdraw an action.
    pub fn revoke(&mut self, action: &str) {
        self.allowed.remove(action);
    }

    /// Check if an action is allowed.
    pub fn check(&self, action: &str) -> bool {
        self.allowed.contains(action)
    }

    /// Allowed actions, sorted.
    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.allowed.iter().cloned().collect();
        actions.sort();
        actions
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = PermissionSet::new();
        set.grant_many(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_check() {
        let mut permissions = PermissionSet::new();
        permissions.grant("read_record");

        assert!(permissions.check("read_record"));
        assert!(!permissions.check("write_record"));
    }

    #[test]
    fn test_from_iter() {
        let permissions: PermissionSet = ["create_patient", "schedule_doctor"].into_iter().collect();
        assert!(permissions.check("create_patient"));
        assert!(permissions.check("schedule_doctor"));
        assert_eq!(permissions.len(), 2);
    }

    #[test]
    fn test_revoke() {
        let mut permissions: PermissionSet = ["order_lab_tests"].into_iter().collect();
        permissions.revoke("order_lab_tests");
        assert!(!permissions.check("order_lab_tests"));
        assert!(permissions.is_empty());
    }

    #[test]
    fn test_actions_sorted() {
        let permissions: PermissionSet = ["b_action", "a_action"].into_iter().collect();
        assert_eq!(permissions.actions(), vec!["a_action", "b_action"]);
        assert!(PermissionSet::new().actions().is_empty());
    }
}
