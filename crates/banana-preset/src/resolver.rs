// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns a trigger message and its preset into a [`GenerationRequest`].
//!
//! Parameters are layered, later wins: compiled defaults, global
//! configuration, preset-declared values, invocation flags. Resolution is a
//! pure function of its inputs.

use banana_config::BananaConfig;
use banana_core::{
    AspectRatio, BananaError, GenerationRequest, ImageSize, ProviderSelection, SelectionOrigin,
};

use crate::params::{FlagParser, ParamValues};
use crate::preset::{Preset, USER_TEXT, contains_placeholder, substitute};

const DEFAULT_MIN_IMAGES: usize = 1;
const DEFAULT_MAX_IMAGES: usize = 6;

/// The global layer: configured prompt defaults plus the enabled provider list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDefaults {
    pub params: ParamValues,
    /// Enabled providers in declaration order.
    pub enabled_providers: Vec<String>,
}

impl GlobalDefaults {
    pub fn from_config(config: &BananaConfig) -> Self {
        let d = &config.defaults;
        Self {
            params: ParamValues {
                min_images: Some(d.min_images),
                max_images: Some(d.max_images),
                refer_images: Some(d.refer_images.clone()),
                image_size: Some(d.image_size),
                aspect_ratio: Some(d.aspect_ratio.clone()),
                google_search: Some(d.google_search),
                preset_append: Some(config.common.preset_append),
                gather_mode: Some(d.gather_mode),
                providers: None,
            },
            enabled_providers: config.enabled_provider_names(),
        }
    }
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            params: compiled_defaults(),
            enabled_providers: Vec::new(),
        }
    }
}

fn compiled_defaults() -> ParamValues {
    ParamValues {
        min_images: Some(DEFAULT_MIN_IMAGES),
        max_images: Some(DEFAULT_MAX_IMAGES),
        refer_images: Some(Vec::new()),
        image_size: Some(ImageSize::default()),
        aspect_ratio: Some(AspectRatio::default()),
        google_search: Some(false),
        preset_append: Some(false),
        gather_mode: Some(false),
        providers: None,
    }
}

/// Resolves trigger messages against presets with a fixed global layer.
#[derive(Debug, Clone)]
pub struct ParameterResolver {
    parser: FlagParser,
    defaults: GlobalDefaults,
}

impl ParameterResolver {
    pub fn new(parser: FlagParser, defaults: GlobalDefaults) -> Self {
        Self { parser, defaults }
    }

    /// Resolves `trigger_text` (the whole message, trigger word first).
    pub fn resolve(
        &self,
        trigger_text: &str,
        preset: &Preset,
    ) -> Result<GenerationRequest, BananaError> {
        resolve(trigger_text, preset, &self.defaults, &self.parser)
    }
}

/// Resolves one invocation. Validation fails before any provider is contacted.
pub fn resolve(
    trigger_text: &str,
    preset: &Preset,
    defaults: &GlobalDefaults,
    parser: &FlagParser,
) -> Result<GenerationRequest, BananaError> {
    let after_trigger = trigger_text
        .trim_start()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let parsed = parser.parse(after_trigger);
    let invocation = ParamValues::from_flags(&parsed.flags)?;

    let layered = compiled_defaults()
        .overlay(&defaults.params)
        .overlay(&preset.params)
        .overlay(&invocation);

    let min_images = layered.min_images.unwrap_or(DEFAULT_MIN_IMAGES);
    let max_images = layered.max_images.unwrap_or(DEFAULT_MAX_IMAGES);
    if min_images > max_images {
        return Err(BananaError::Validation {
            flag: "min_images".to_string(),
            value: min_images.to_string(),
            expected: format!("at most max_images ({max_images})"),
        });
    }

    let mut template = if preset.prompt.trim().is_empty() {
        USER_TEXT.to_string()
    } else {
        preset.prompt.clone()
    };
    if layered.preset_append.unwrap_or(false) && !contains_placeholder(&template) {
        template.push(' ');
        template.push_str(USER_TEXT);
    }
    let prompt = substitute(&template, &parsed.text).trim().to_string();

    let providers = match (&invocation.providers, &preset.params.providers) {
        (Some(names), _) => ProviderSelection {
            names: names.clone(),
            origin: SelectionOrigin::Invocation,
        },
        (None, Some(names)) => ProviderSelection {
            names: names.clone(),
            origin: SelectionOrigin::Preset,
        },
        (None, None) => ProviderSelection {
            names: defaults.enabled_providers.clone(),
            origin: SelectionOrigin::Default,
        },
    };

    Ok(GenerationRequest {
        trigger: preset.trigger.clone(),
        prompt,
        images: Vec::new(),
        aspect_ratio: layered.aspect_ratio.unwrap_or_default(),
        image_size: layered.image_size.unwrap_or_default(),
        google_search: layered.google_search.unwrap_or(false),
        providers,
        min_images,
        max_images,
        refer_images: layered.refer_images.unwrap_or_default(),
        gather_mode: layered.gather_mode.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::preset::parse_line;

    fn preset(line: &str) -> Preset {
        parse_line(line, &FlagParser::default())
            .unwrap()
            .remove(0)
    }

    fn defaults() -> GlobalDefaults {
        GlobalDefaults {
            enabled_providers: vec!["gemini-primary".into(), "openai".into()],
            ..GlobalDefaults::default()
        }
    }

    #[test]
    fn invocation_flags_override_preset() {
        let p = preset("bnt {{user_text}} --min_images 0");
        let req = resolve(
            "bnt sunset over mountains --aspect_ratio 16:9 --providers gemini-primary,gemini-backup",
            &p,
            &defaults(),
            &FlagParser::default(),
        )
        .unwrap();
        assert_eq!(req.prompt, "sunset over mountains");
        assert_eq!(req.aspect_ratio.as_str(), "16:9");
        assert_eq!(req.providers.names, vec!["gemini-primary", "gemini-backup"]);
        assert_eq!(req.providers.origin, SelectionOrigin::Invocation);
        assert_eq!(req.min_images, 0);
        assert!(req.images.is_empty());
    }

    #[test]
    fn layering_order() {
        let mut global = defaults();
        global.params.image_size = Some(ImageSize::TwoK);
        global.params.max_images = Some(3);
        let p = preset("bna figurine --image_size 4K --gather_mode");
        let req = resolve("bna --max_images 5", &p, &global, &FlagParser::default()).unwrap();
        assert_eq!(req.image_size, ImageSize::FourK);
        assert_eq!(req.max_images, 5);
        assert!(req.gather_mode);
        assert_eq!(req.providers.origin, SelectionOrigin::Default);
        assert_eq!(req.providers.names, vec!["gemini-primary", "openai"]);
    }

    #[test]
    fn preset_providers_used_when_invocation_silent() {
        let p = preset("bnx draw --providers backup");
        let req = resolve("bnx", &p, &defaults(), &FlagParser::default()).unwrap();
        assert_eq!(req.providers.names, vec!["backup"]);
        assert_eq!(req.providers.origin, SelectionOrigin::Preset);
    }

    #[test]
    fn min_above_max_rejected() {
        let p = preset("bnt {{user_text}}");
        let err = resolve(
            "bnt x --min_images 4 --max_images 2",
            &p,
            &defaults(),
            &FlagParser::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BananaError::Validation { flag, .. } if flag == "min_images"));
    }

    #[test]
    fn preset_append_adds_placeholder() {
        let p = preset("bnf fixed prompt --preset_append");
        let req = resolve("bnf with extra", &p, &defaults(), &FlagParser::default()).unwrap();
        assert_eq!(req.prompt, "fixed prompt with extra");

        let p = preset("bnf fixed prompt");
        let req = resolve("bnf with extra", &p, &defaults(), &FlagParser::default()).unwrap();
        assert_eq!(req.prompt, "fixed prompt");
    }

    #[test]
    fn empty_preset_prompt_is_user_text() {
        let p = preset("bne --min_images 0");
        let req = resolve("bne a red fox", &p, &defaults(), &FlagParser::default()).unwrap();
        assert_eq!(req.prompt, "a red fox");
    }

    #[test]
    fn legacy_placeholder_substituted() {
        let p = preset("bnl style of {{input}}");
        let req = resolve("bnl monet", &p, &defaults(), &FlagParser::default()).unwrap();
        assert_eq!(req.prompt, "style of monet");
    }

    #[test]
    fn aliases_apply_to_invocation() {
        let parser = FlagParser::new(HashMap::from([("ar".into(), "aspect_ratio".into())]));
        let p = preset("bnt {{user_text}}");
        let req = resolve("bnt cat --ar 3:4", &p, &defaults(), &parser).unwrap();
        assert_eq!(req.aspect_ratio.as_str(), "3:4");
        assert_eq!(req.prompt, "cat");
    }

    #[test]
    fn coercion_error_surfaces() {
        let p = preset("bnt {{user_text}}");
        let err = resolve("bnt x --image_size huge", &p, &defaults(), &FlagParser::default())
            .unwrap_err();
        assert!(matches!(err, BananaError::Validation { flag, value, .. }
            if flag == "image_size" && value == "huge"));
    }
}
