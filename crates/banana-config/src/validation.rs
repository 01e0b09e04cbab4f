// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as image bounds, provider name uniqueness, and alias syntax.

use std::collections::{HashMap, HashSet};

use crate::diagnostic::ConfigError;
use crate::model::BananaConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BananaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.defaults.min_images > config.defaults.max_images {
        errors.push(ConfigError::Validation {
            message: format!(
                "defaults.min_images ({}) must not exceed defaults.max_images ({})",
                config.defaults.min_images, config.defaults.max_images
            ),
        });
    }

    if config.common.max_retry == 0 {
        errors.push(ConfigError::Validation {
            message: "common.max_retry must be at least 1".to_string(),
        });
    }

    if config.gather.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "gather.timeout_secs must be at least 1".to_string(),
        });
    }

    let terminators: HashSet<&str> = config
        .gather
        .start_words
        .iter()
        .map(|w| w.trim())
        .collect();
    for word in &config.gather.cancel_words {
        if terminators.contains(word.trim()) {
            errors.push(ConfigError::Validation {
                message: format!("`{word}` is both a gather start word and a cancel word"),
            });
        }
    }

    let mut seen_names = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        if provider.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("providers[{i}].name must not be empty"),
            });
            continue;
        }
        if !seen_names.insert(provider.name.as_str()) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "duplicate provider name `{}` in [[providers]] array",
                    provider.name
                ),
            });
        }
        if provider.enabled && provider.keys.iter().all(|k| k.trim().is_empty()) {
            errors.push(ConfigError::Validation {
                message: format!("provider `{}` is enabled but has no API keys", provider.name),
            });
        }
        if provider.timeout_secs == Some(0) {
            errors.push(ConfigError::Validation {
                message: format!("provider `{}` timeout_secs must be at least 1", provider.name),
            });
        }
    }

    let aliases = match parse_aliases(&config.params_alias) {
        Ok(aliases) => aliases,
        Err(alias_errors) => {
            errors.extend(alias_errors);
            HashMap::new()
        }
    };

    for line in &config.presets {
        let trigger = line.split_whitespace().next().unwrap_or_default();
        if trigger.is_empty() || trigger == "[]" {
            errors.push(ConfigError::Validation {
                message: format!("preset line `{line}` has no trigger"),
            });
            continue;
        }
        for name in preset_provider_names(line, &aliases) {
            if !seen_names.contains(name) {
                errors.push(ConfigError::Validation {
                    message: format!("preset `{trigger}` references unknown provider `{name}`"),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parses `alias:param` entries into a lookup map.
pub fn parse_aliases(entries: &[String]) -> Result<HashMap<String, String>, Vec<ConfigError>> {
    let mut aliases = HashMap::new();
    let mut errors = Vec::new();
    for entry in entries {
        match entry.split_once(':') {
            Some((alias, param)) if !alias.trim().is_empty() && !param.trim().is_empty() => {
                aliases.insert(alias.trim().to_string(), param.trim().to_string());
            }
            _ => errors.push(ConfigError::Validation {
                message: format!("params_alias entry `{entry}` must look like `alias:param`"),
            }),
        }
    }
    if errors.is_empty() {
        Ok(aliases)
    } else {
        Err(errors)
    }
}

/// Provider names a preset line lists after `--providers` (or an alias of it).
fn preset_provider_names<'a>(line: &'a str, aliases: &HashMap<String, String>) -> Vec<&'a str> {
    let mut tokens = line.split_whitespace().skip(1);
    let mut names = Vec::new();
    while let Some(token) = tokens.next() {
        let Some(flag) = token.strip_prefix("--") else {
            continue;
        };
        let flag = aliases.get(flag).map(String::as_str).unwrap_or(flag);
        if flag != "providers" {
            continue;
        }
        if let Some(value) = tokens.next() {
            names.extend(value.split(',').map(str::trim).filter(|n| !n.is_empty()));
        }
    }
    names
}
