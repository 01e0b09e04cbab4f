// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `banana presets` and `banana resolve`.

use banana_config::BananaConfig;
use banana_core::{BananaError, GenerationRequest};
use banana_preset::{GlobalDefaults, ParameterResolver, PresetStore};

pub fn print_presets(config: &BananaConfig) -> Result<(), BananaError> {
    let store = PresetStore::from_config(config)?;
    let triggers = store.triggers();
    if triggers.is_empty() {
        println!("no presets configured");
        return Ok(());
    }
    for trigger in triggers {
        if let Some(preset) = store.get(&trigger) {
            println!("{trigger}");
            for line in preset.details().lines() {
                println!("    {line}");
            }
        }
    }
    Ok(())
}

pub fn print_resolution(config: &BananaConfig, text: &str) -> Result<(), BananaError> {
    let request = resolve_invocation(config, text)?;
    let json = serde_json::to_string_pretty(&request)
        .map_err(|e| BananaError::Internal(format!("failed to render request: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Resolves `text` the same way an inbound chat message would be.
pub fn resolve_invocation(
    config: &BananaConfig,
    text: &str,
) -> Result<GenerationRequest, BananaError> {
    let store = PresetStore::from_config(config)?;
    let trigger = text.split_whitespace().next().unwrap_or_default();
    let preset = store
        .get(trigger)
        .ok_or_else(|| BananaError::Config(format!("no preset named `{trigger}`")))?;
    let resolver =
        ParameterResolver::new(store.parser().clone(), GlobalDefaults::from_config(config));
    resolver.resolve(text, &preset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BananaConfig {
        banana_config::load_and_validate_str(
            r#"
presets = ["bnn {{user_text}} --min_images 0"]
params_alias = ["ar:aspect_ratio"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_like_a_chat_message() {
        let req = resolve_invocation(&config(), "bnn a cat --ar 16:9").unwrap();
        assert_eq!(req.trigger, "bnn");
        assert_eq!(req.prompt, "a cat");
        assert_eq!(req.aspect_ratio.to_string(), "16:9");
    }

    #[test]
    fn unknown_trigger_is_an_error() {
        let err = resolve_invocation(&config(), "nope x").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn invalid_flags_surface_validation() {
        let err = resolve_invocation(&config(), "bnn x --ar wide").unwrap_err();
        assert!(matches!(err, BananaError::Validation { .. }));
    }
}
