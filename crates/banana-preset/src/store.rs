// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory preset store with lock-free reads.
//!
//! Readers load the current [`PresetTable`] snapshot through `ArcSwap`; admin
//! mutations rebuild the table from the edited definition lines and swap it in
//! under a writer lock, so a request always sees one consistent table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use banana_config::BananaConfig;
use banana_core::BananaError;
use tracing::{info, warn};

use crate::params::FlagParser;
use crate::preset::{Preset, format_line, parse_line, split_line};

/// Whether an upsert created or replaced a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
}

/// How much of a multi-trigger line a delete removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    /// Remove only the named trigger; siblings keep the prompt.
    Trigger,
    /// Remove the whole definition line with every trigger on it.
    Line,
}

/// What a delete removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The definition line is gone.
    Line { triggers: Vec<String> },
    /// The trigger was dropped from a shared line; `remaining` still use it.
    Trigger { remaining: Vec<String> },
}

/// An immutable snapshot of parsed presets.
#[derive(Debug, Default)]
pub struct PresetTable {
    lines: Vec<String>,
    presets: HashMap<String, Arc<Preset>>,
    order: Vec<String>,
}

impl PresetTable {
    fn build(lines: Vec<String>, parser: &FlagParser) -> Result<Self, BananaError> {
        let mut presets = HashMap::new();
        let mut order = Vec::new();
        for line in &lines {
            for preset in parse_line(line, parser)? {
                let trigger = preset.trigger.clone();
                if presets.insert(trigger.clone(), Arc::new(preset)).is_some() {
                    warn!(trigger = %trigger, "trigger defined twice, later definition wins");
                } else {
                    order.push(trigger);
                }
            }
        }
        Ok(Self {
            lines,
            presets,
            order,
        })
    }

    /// Index of the line defining `trigger`, scanning from the end so the
    /// winning definition is found.
    fn line_of(&self, trigger: &str) -> Option<(usize, Vec<String>, String)> {
        self.lines.iter().enumerate().rev().find_map(|(i, line)| {
            let (triggers, body) = split_line(line)?;
            triggers
                .iter()
                .any(|t| t == trigger)
                .then(|| (i, triggers.clone(), body.to_string()))
        })
    }
}

/// Presets keyed by trigger word.
pub struct PresetStore {
    parser: FlagParser,
    table: ArcSwap<PresetTable>,
    write: Mutex<()>,
}

impl PresetStore {
    /// Parses definition lines; any malformed line fails the whole store.
    pub fn new(lines: Vec<String>, parser: FlagParser) -> Result<Self, BananaError> {
        let table = PresetTable::build(lines, &parser)?;
        info!(count = table.order.len(), "loaded presets");
        Ok(Self {
            parser,
            table: ArcSwap::from_pointee(table),
            write: Mutex::new(()),
        })
    }

    /// Builds the store from `presets` and `params_alias`.
    pub fn from_config(config: &BananaConfig) -> Result<Self, BananaError> {
        let aliases = banana_config::parse_aliases(&config.params_alias).map_err(|errors| {
            BananaError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        Self::new(config.presets.clone(), FlagParser::new(aliases))
    }

    /// Flag parser configured with the alias map.
    pub fn parser(&self) -> &FlagParser {
        &self.parser
    }

    pub fn get(&self, trigger: &str) -> Option<Arc<Preset>> {
        self.table.load().presets.get(trigger).cloned()
    }

    /// Triggers in definition order.
    pub fn triggers(&self) -> Vec<String> {
        self.table.load().order.clone()
    }

    /// Current definition lines, suitable for writing back to config.
    pub fn lines(&self) -> Vec<String> {
        self.table.load().lines.clone()
    }

    /// Adds or replaces the preset for `trigger`.
    ///
    /// `body` is everything after the trigger: prompt text plus flags. If the
    /// trigger shares a line with others it is split out onto its own line.
    pub fn upsert(&self, trigger: &str, body: &str) -> Result<UpsertOutcome, BananaError> {
        validate_trigger(trigger)?;
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.table.load();
        let mut lines = current.lines.clone();
        let new_line = format_line(&[trigger.to_string()], body.trim());

        let outcome = match current.line_of(trigger) {
            Some((i, triggers, _)) if triggers.len() == 1 => {
                lines[i] = new_line;
                UpsertOutcome::Updated
            }
            Some((i, triggers, old_body)) => {
                let remaining: Vec<String> =
                    triggers.into_iter().filter(|t| t != trigger).collect();
                lines[i] = format_line(&remaining, &old_body);
                lines.push(new_line);
                UpsertOutcome::Updated
            }
            None => {
                lines.push(new_line);
                UpsertOutcome::Added
            }
        };

        let table = PresetTable::build(lines, &self.parser)?;
        self.table.store(Arc::new(table));
        info!(trigger, ?outcome, "preset saved");
        Ok(outcome)
    }

    /// Deletes `trigger`. Returns `Ok(None)` when no such trigger exists.
    pub fn delete(
        &self,
        trigger: &str,
        scope: DeleteScope,
    ) -> Result<Option<Removal>, BananaError> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.table.load();
        let Some((i, triggers, body)) = current.line_of(trigger) else {
            return Ok(None);
        };
        let mut lines = current.lines.clone();

        let removal = if triggers.len() == 1 || scope == DeleteScope::Line {
            lines.remove(i);
            Removal::Line { triggers }
        } else {
            let remaining: Vec<String> = triggers.into_iter().filter(|t| t != trigger).collect();
            lines[i] = format_line(&remaining, &body);
            Removal::Trigger { remaining }
        };

        let table = PresetTable::build(lines, &self.parser)?;
        self.table.store(Arc::new(table));
        info!(trigger, ?scope, "preset deleted");
        Ok(Some(removal))
    }
}

fn validate_trigger(trigger: &str) -> Result<(), BananaError> {
    let bad = trigger.is_empty()
        || trigger.chars().any(char::is_whitespace)
        || trigger.starts_with('[')
        || trigger.starts_with("--");
    if bad {
        return Err(BananaError::Validation {
            flag: "trigger".to_string(),
            value: trigger.to_string(),
            expected: "a single word that is not a flag".to_string(),
        });
    }
    Ok(())
}
