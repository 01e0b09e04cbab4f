// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Administrative operations on presets and the whitelist.
//!
//! Mutations only touch the in-memory stores; the configuration file is
//! never rewritten. Every operation except reading a single preset requires
//! the caller to be listed in `admin.ids`.

use std::collections::HashSet;
use std::sync::Arc;

use banana_config::model::AdminConfig;
use banana_core::{BananaError, ParticipantId};
use banana_preset::{DeleteScope, PresetStore, Removal, UpsertOutcome};
use banana_preset::preset::split_line;
use banana_security::{Whitelist, WhitelistScope, WhitelistSnapshot};
use tracing::info;

/// Preset and whitelist management, gated on administrator identity.
#[derive(Clone)]
pub struct AdminOps {
    presets: Arc<PresetStore>,
    whitelist: Arc<Whitelist>,
    admins: Arc<HashSet<String>>,
}

impl AdminOps {
    pub fn new(presets: Arc<PresetStore>, whitelist: Arc<Whitelist>, config: &AdminConfig) -> Self {
        Self {
            presets,
            whitelist,
            admins: Arc::new(config.ids.iter().cloned().collect()),
        }
    }

    pub fn is_admin(&self, caller: &ParticipantId) -> bool {
        self.admins.contains(&caller.0)
    }

    fn authorize(&self, caller: &ParticipantId, operation: &str) -> Result<(), BananaError> {
        if self.is_admin(caller) {
            return Ok(());
        }
        info!(caller = %caller, operation, "admin operation refused");
        Err(BananaError::PermissionDenied {
            subject: format!("{operation} by {caller}"),
        })
    }

    /// Adds or replaces a preset. `body` is the prompt plus flags.
    pub fn add_preset(
        &self,
        caller: &ParticipantId,
        trigger: &str,
        body: &str,
    ) -> Result<UpsertOutcome, BananaError> {
        self.authorize(caller, "add_preset")?;
        self.presets.upsert(trigger, body)
    }

    /// Deletes a preset; `scope` decides what happens to a shared line.
    pub fn delete_preset(
        &self,
        caller: &ParticipantId,
        trigger: &str,
        scope: DeleteScope,
    ) -> Result<Option<Removal>, BananaError> {
        self.authorize(caller, "delete_preset")?;
        self.presets.delete(trigger, scope)
    }

    /// Other triggers defined on the same line as `trigger`.
    pub fn shared_triggers(&self, trigger: &str) -> Vec<String> {
        self.presets
            .lines()
            .iter()
            .rev()
            .filter_map(|line| split_line(line).map(|(triggers, _)| triggers))
            .find(|triggers| triggers.iter().any(|t| t == trigger))
            .map(|triggers| triggers.into_iter().filter(|t| t != trigger).collect())
            .unwrap_or_default()
    }

    pub fn list_presets(&self, caller: &ParticipantId) -> Result<Vec<String>, BananaError> {
        self.authorize(caller, "list_presets")?;
        Ok(self.presets.triggers())
    }

    /// Prompt and declared parameters of one preset. Open to everyone.
    pub fn get_preset_prompt(&self, trigger: &str) -> Option<String> {
        self.presets.get(trigger).map(|p| p.details())
    }

    /// Returns `false` when the entry was already present.
    pub fn add_whitelist(
        &self,
        caller: &ParticipantId,
        scope: WhitelistScope,
        id: &str,
    ) -> Result<bool, BananaError> {
        self.authorize(caller, "add_whitelist")?;
        Ok(self.whitelist.add(scope, id))
    }

    /// Returns `false` when the entry was not present.
    pub fn remove_whitelist(
        &self,
        caller: &ParticipantId,
        scope: WhitelistScope,
        id: &str,
    ) -> Result<bool, BananaError> {
        self.authorize(caller, "remove_whitelist")?;
        Ok(self.whitelist.remove(scope, id))
    }

    pub fn list_whitelist(&self, caller: &ParticipantId) -> Result<WhitelistSnapshot, BananaError> {
        self.authorize(caller, "list_whitelist")?;
        Ok(self.whitelist.snapshot())
    }

    /// Runs a chat command and renders the reply text.
    pub fn execute(
        &self,
        caller: &ParticipantId,
        command: AdminCommand,
    ) -> Result<String, BananaError> {
        let reply = match command {
            AdminCommand::AddPreset { trigger, body } => {
                if body.trim().is_empty() {
                    return Ok(format!("❌ Usage: {} <trigger> <prompt> [--flag value]...", ADD));
                }
                match self.add_preset(caller, &trigger, &body)? {
                    UpsertOutcome::Added => format!("✅ Added preset 「{trigger}」"),
                    UpsertOutcome::Updated => format!("✅ Updated preset 「{trigger}」"),
                }
            }
            AdminCommand::DeletePreset { trigger, scope } => {
                match self.delete_preset(caller, &trigger, scope)? {
                    None => format!("❌ No preset named 「{trigger}」"),
                    Some(Removal::Line { triggers }) => {
                        format!("🗑️ Deleted preset 「{}」", triggers.join(","))
                    }
                    Some(Removal::Trigger { remaining }) => format!(
                        "🗑️ Deleted 「{trigger}」; 「{}」 keep the prompt. Send `{DELETE} <trigger> --all` to remove the whole line.",
                        remaining.join(",")
                    ),
                }
            }
            AdminCommand::ListPresets => {
                let triggers = self.list_presets(caller)?;
                if triggers.is_empty() {
                    "No presets defined.".to_string()
                } else {
                    format!("📜 Presets:\n{}", triggers.join("、"))
                }
            }
            AdminCommand::PresetDetails { trigger } => match self.get_preset_prompt(&trigger) {
                Some(details) => format!("📋 Preset 「{trigger}」\n{details}"),
                None => format!("❌ No preset named 「{trigger}」"),
            },
            AdminCommand::AddWhitelist { scope, id } => {
                if self.add_whitelist(caller, scope, &id)? {
                    format!("✅ Added {scope} {id} to the whitelist")
                } else {
                    format!("⚠️ {id} is already whitelisted")
                }
            }
            AdminCommand::RemoveWhitelist { scope, id } => {
                if self.remove_whitelist(caller, scope, &id)? {
                    format!("🗑️ Removed {scope} {id} from the whitelist")
                } else {
                    format!("⚠️ {id} is not whitelisted")
                }
            }
            AdminCommand::ListWhitelist => render_whitelist(&self.list_whitelist(caller)?),
        };
        Ok(reply)
    }
}

fn render_whitelist(snapshot: &WhitelistSnapshot) -> String {
    let flag = |on: bool| if on { "on" } else { "off" };
    format!(
        "📋 Whitelist\ngroups ({}): {}\nusers ({}): {}",
        flag(snapshot.group_enabled),
        snapshot.groups.join(", "),
        flag(snapshot.user_enabled),
        snapshot.users.join(", "),
    )
}

const ADD: &str = "lma";
const DELETE: &str = "lmd";
const LIST: &str = "lml";
const DETAILS: &str = "lmc";
const WL_ADD: &str = "lmawl";
const WL_DEL: &str = "lmdwl";
const WL_LIST: &str = "lmwll";

/// A parsed administrative chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    AddPreset { trigger: String, body: String },
    DeletePreset { trigger: String, scope: DeleteScope },
    ListPresets,
    PresetDetails { trigger: String },
    AddWhitelist { scope: WhitelistScope, id: String },
    RemoveWhitelist { scope: WhitelistScope, id: String },
    ListWhitelist,
}

impl AdminCommand {
    /// Recognizes command words and their long aliases.
    ///
    /// Returns `None` for anything that is not an admin command, including
    /// commands with missing arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (word, rest) = text
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((text, ""));
        let mut args = rest.split_whitespace();

        match word {
            ADD | "lm添加" => {
                let trigger = args.next()?.to_string();
                let body = rest[trigger.len()..].trim().to_string();
                Some(AdminCommand::AddPreset { trigger, body })
            }
            DELETE | "lm删除" => {
                let trigger = args.next()?.to_string();
                let scope = match args.next() {
                    Some("--all") => DeleteScope::Line,
                    _ => DeleteScope::Trigger,
                };
                Some(AdminCommand::DeletePreset { trigger, scope })
            }
            LIST | "lm列表" => Some(AdminCommand::ListPresets),
            DETAILS | "lm提示词" | "lm详情" => Some(AdminCommand::PresetDetails {
                trigger: args.next()?.to_string(),
            }),
            WL_ADD | "lm白名单添加" => {
                let scope = args.next()?.parse().ok()?;
                let id = args.next()?.to_string();
                Some(AdminCommand::AddWhitelist { scope, id })
            }
            WL_DEL | "lm白名单删除" => {
                let scope = args.next()?.parse().ok()?;
                let id = args.next()?.to_string();
                Some(AdminCommand::RemoveWhitelist { scope, id })
            }
            WL_LIST | "lm白名单列表" => Some(AdminCommand::ListWhitelist),
            _ => None,
        }
    }

    /// Whether the command reads or changes state that only admins may see.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, AdminCommand::PresetDetails { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banana_config::model::WhitelistConfig;
    use banana_preset::FlagParser;

    fn ops() -> AdminOps {
        let presets = PresetStore::new(
            vec![
                "bnt {{user_text}} --min_images 0".to_string(),
                "[fig,toy] turn into a figure --aspect_ratio 3:4".to_string(),
            ],
            FlagParser::default(),
        )
        .unwrap();
        let whitelist = Whitelist::from_config(&WhitelistConfig {
            user_enabled: true,
            users: vec!["alice".into()],
            ..Default::default()
        });
        AdminOps::new(
            Arc::new(presets),
            Arc::new(whitelist),
            &AdminConfig {
                ids: vec!["root".into()],
            },
        )
    }

    fn root() -> ParticipantId {
        ParticipantId("root".into())
    }

    #[test]
    fn non_admin_is_refused() {
        let ops = ops();
        let err = ops
            .add_preset(&ParticipantId("mallory".into()), "x", "anything")
            .unwrap_err();
        assert!(matches!(err, BananaError::PermissionDenied { .. }));
        assert!(ops.get_preset_prompt("x").is_none());
        assert!(ops.list_presets(&ParticipantId("mallory".into())).is_err());
    }

    #[test]
    fn add_then_read_prompt() {
        let ops = ops();
        assert_eq!(
            ops.add_preset(&root(), "cat", "a cat {{user_text}} --max_images 2")
                .unwrap(),
            UpsertOutcome::Added
        );
        let details = ops.get_preset_prompt("cat").unwrap();
        assert!(details.starts_with("a cat {{user_text}}"));
        assert!(details.contains("max_images: 2"));
    }

    #[test]
    fn delete_scope_on_shared_line() {
        let ops = ops();
        assert_eq!(ops.shared_triggers("fig"), vec!["toy"]);
        let removal = ops
            .delete_preset(&root(), "fig", DeleteScope::Trigger)
            .unwrap();
        assert_eq!(
            removal,
            Some(Removal::Trigger {
                remaining: vec!["toy".into()]
            })
        );
        assert!(ops.get_preset_prompt("toy").is_some());

        let removal = ops.delete_preset(&root(), "toy", DeleteScope::Line).unwrap();
        assert!(matches!(removal, Some(Removal::Line { .. })));
        assert_eq!(ops.list_presets(&root()).unwrap(), vec!["bnt"]);
    }

    #[test]
    fn whitelist_round_trip() {
        let ops = ops();
        assert!(ops.add_whitelist(&root(), WhitelistScope::Group, "g1").unwrap());
        assert!(!ops.add_whitelist(&root(), WhitelistScope::Group, "g1").unwrap());
        assert!(ops.remove_whitelist(&root(), WhitelistScope::User, "alice").unwrap());
        let snapshot = ops.list_whitelist(&root()).unwrap();
        assert_eq!(snapshot.groups, vec!["g1"]);
        assert!(snapshot.users.is_empty());
    }

    #[test]
    fn parses_command_forms() {
        assert_eq!(
            AdminCommand::parse("lma cat a cat --max_images 2"),
            Some(AdminCommand::AddPreset {
                trigger: "cat".into(),
                body: "a cat --max_images 2".into()
            })
        );
        assert_eq!(
            AdminCommand::parse("lm删除 fig --all"),
            Some(AdminCommand::DeletePreset {
                trigger: "fig".into(),
                scope: DeleteScope::Line
            })
        );
        assert_eq!(
            AdminCommand::parse("lmawl 群组 123"),
            Some(AdminCommand::AddWhitelist {
                scope: WhitelistScope::Group,
                id: "123".into()
            })
        );
        assert_eq!(AdminCommand::parse("lmawl nobody 123"), None);
        assert_eq!(AdminCommand::parse("lmd"), None);
        assert_eq!(AdminCommand::parse("bnt a cat"), None);
        assert!(!AdminCommand::parse("lmc bnt").unwrap().requires_admin());
    }

    #[test]
    fn execute_renders_replies() {
        let ops = ops();
        let reply = ops
            .execute(&root(), AdminCommand::parse("lmd fig").unwrap())
            .unwrap();
        assert!(reply.contains("toy"));
        let reply = ops.execute(&root(), AdminCommand::ListWhitelist).unwrap();
        assert!(reply.contains("users (on): alice"));
        let reply = ops
            .execute(&root(), AdminCommand::parse("lma empty").unwrap())
            .unwrap();
        assert!(reply.starts_with("❌ Usage"));
    }
}
