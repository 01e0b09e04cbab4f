// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group and user whitelists.
//!
//! Each scope has its own enable flag. A disabled scope admits everyone; an
//! enabled scope admits only listed identifiers. Denied messages are dropped
//! without any reply.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use banana_config::model::WhitelistConfig;
use banana_core::InboundMessage;
use strum::{Display, EnumString};
use tracing::debug;

/// Which list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum WhitelistScope {
    #[strum(to_string = "user", serialize = "用户")]
    User,
    #[strum(to_string = "group", serialize = "群组")]
    Group,
}

/// Why a message was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Group(String),
    User(String),
}

/// Current contents of both lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistSnapshot {
    pub group_enabled: bool,
    pub groups: Vec<String>,
    pub user_enabled: bool,
    pub users: Vec<String>,
}

#[derive(Debug, Default)]
struct Lists {
    groups: BTreeSet<String>,
    users: BTreeSet<String>,
}

impl Lists {
    fn scope_mut(&mut self, scope: WhitelistScope) -> &mut BTreeSet<String> {
        match scope {
            WhitelistScope::User => &mut self.users,
            WhitelistScope::Group => &mut self.groups,
        }
    }
}

/// Mutable whitelist shared by the orchestrator and admin operations.
#[derive(Debug)]
pub struct Whitelist {
    group_enabled: bool,
    user_enabled: bool,
    lists: RwLock<Lists>,
}

impl Whitelist {
    pub fn from_config(config: &WhitelistConfig) -> Self {
        Self {
            group_enabled: config.group_enabled,
            user_enabled: config.user_enabled,
            lists: RwLock::new(Lists {
                groups: config.groups.iter().cloned().collect(),
                users: config.users.iter().cloned().collect(),
            }),
        }
    }

    /// Everyone allowed.
    pub fn open() -> Self {
        Self::from_config(&WhitelistConfig::default())
    }

    /// Checks a message against both scopes.
    ///
    /// The group list applies to group messages and matches either the group
    /// id or the conversation id.
    pub fn check(&self, msg: &InboundMessage) -> Result<(), Denial> {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        if self.group_enabled {
            if let Some(group) = &msg.group {
                let listed = lists.groups.contains(group)
                    || lists.groups.contains(&msg.conversation.0);
                if !listed {
                    debug!(group = %group, "group not whitelisted, dropping message");
                    return Err(Denial::Group(group.clone()));
                }
            }
        }
        if self.user_enabled && !lists.users.contains(&msg.sender.0) {
            debug!(user = %msg.sender, "user not whitelisted, dropping message");
            return Err(Denial::User(msg.sender.0.clone()));
        }
        Ok(())
    }

    pub fn is_allowed(&self, msg: &InboundMessage) -> bool {
        self.check(msg).is_ok()
    }

    /// Adds an identifier. Returns `false` when it was already listed.
    pub fn add(&self, scope: WhitelistScope, id: &str) -> bool {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        lists.scope_mut(scope).insert(id.to_string())
    }

    /// Removes an identifier. Returns `false` when it was not listed.
    pub fn remove(&self, scope: WhitelistScope, id: &str) -> bool {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        lists.scope_mut(scope).remove(id)
    }

    pub fn snapshot(&self) -> WhitelistSnapshot {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        WhitelistSnapshot {
            group_enabled: self.group_enabled,
            groups: lists.groups.iter().cloned().collect(),
            user_enabled: self.user_enabled,
            users: lists.users.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_msg(group: &str, sender: &str) -> InboundMessage {
        let mut msg = InboundMessage::text(format!("grp:{group}"), sender, "bnt");
        msg.group = Some(group.to_string());
        msg
    }

    #[test]
    fn disabled_scopes_admit_everyone() {
        let wl = Whitelist::open();
        assert!(wl.is_allowed(&group_msg("g1", "u1")));
    }

    #[test]
    fn group_scope_filters_group_messages_only() {
        let wl = Whitelist::from_config(&WhitelistConfig {
            group_enabled: true,
            groups: vec!["g1".into()],
            ..WhitelistConfig::default()
        });
        assert!(wl.is_allowed(&group_msg("g1", "u1")));
        assert_eq!(wl.check(&group_msg("g2", "u1")), Err(Denial::Group("g2".into())));
        assert!(wl.is_allowed(&InboundMessage::text("dm", "u1", "bnt")));
    }

    #[test]
    fn conversation_id_matches_group_list() {
        let wl = Whitelist::from_config(&WhitelistConfig {
            group_enabled: true,
            groups: vec!["grp:g9".into()],
            ..WhitelistConfig::default()
        });
        assert!(wl.is_allowed(&group_msg("g9", "u1")));
    }

    #[test]
    fn user_scope_applies_everywhere() {
        let wl = Whitelist::from_config(&WhitelistConfig {
            user_enabled: true,
            users: vec!["alice".into()],
            ..WhitelistConfig::default()
        });
        assert!(wl.is_allowed(&InboundMessage::text("dm", "alice", "bnt")));
        assert_eq!(
            wl.check(&group_msg("g1", "bob")),
            Err(Denial::User("bob".into()))
        );
    }

    #[test]
    fn add_and_remove_report_changes() {
        let wl = Whitelist::open();
        assert!(wl.add(WhitelistScope::User, "alice"));
        assert!(!wl.add(WhitelistScope::User, "alice"));
        assert_eq!(wl.snapshot().users, vec!["alice"]);
        assert!(wl.remove(WhitelistScope::User, "alice"));
        assert!(!wl.remove(WhitelistScope::User, "alice"));
        assert!(wl.snapshot().users.is_empty());
    }

    #[test]
    fn scope_parses_both_spellings() {
        assert_eq!("user".parse::<WhitelistScope>().unwrap(), WhitelistScope::User);
        assert_eq!("Group".parse::<WhitelistScope>().unwrap(), WhitelistScope::Group);
        assert_eq!("群组".parse::<WhitelistScope>().unwrap(), WhitelistScope::Group);
        assert!("channel".parse::<WhitelistScope>().is_err());
        assert_eq!(WhitelistScope::Group.to_string(), "group");
    }
}
