// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Preset model and definition-line syntax.
//!
//! A definition line is `<trigger> <prompt> [--flag value]...`. The trigger
//! may be a bracketed list (`[a,b,c]`) so several triggers share one prompt.

use banana_core::BananaError;

use crate::params::{FlagParser, ParamValues};

/// Placeholder replaced with the invocation's free text.
pub const USER_TEXT: &str = "{{user_text}}";

/// Older spellings accepted in existing preset definitions.
pub const LEGACY_PLACEHOLDERS: &[&str] = &["{{text}}", "{{input}}"];

/// A named prompt template with default parameter overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub trigger: String,
    /// Prompt text with flags stripped; may contain the placeholder.
    pub prompt: String,
    pub params: ParamValues,
}

impl Preset {
    /// Whether the prompt contains the user text placeholder or a legacy alias.
    pub fn has_placeholder(&self) -> bool {
        contains_placeholder(&self.prompt)
    }

    /// Prompt followed by one `name: value` line per declared parameter.
    pub fn details(&self) -> String {
        let mut lines = vec![self.prompt.clone()];
        lines.extend(
            self.params
                .describe()
                .into_iter()
                .map(|(name, value)| format!("{name}: {value}")),
        );
        lines.join("\n")
    }
}

pub(crate) fn contains_placeholder(prompt: &str) -> bool {
    prompt.contains(USER_TEXT) || LEGACY_PLACEHOLDERS.iter().any(|p| prompt.contains(p))
}

/// Replaces the placeholder and its legacy aliases with `text`.
pub(crate) fn substitute(prompt: &str, text: &str) -> String {
    let mut out = prompt.replace(USER_TEXT, text);
    for legacy in LEGACY_PLACEHOLDERS {
        out = out.replace(legacy, text);
    }
    out
}

/// Splits a definition line into its triggers and the remaining body.
pub fn split_line(line: &str) -> Option<(Vec<String>, &str)> {
    let line = line.trim();
    let (head, body) = match line.split_once(char::is_whitespace) {
        Some((head, body)) => (head, body.trim_start()),
        None => (line, ""),
    };
    let triggers: Vec<String> = match head
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        None if head.is_empty() => Vec::new(),
        None => vec![head.to_string()],
    };
    if triggers.is_empty() {
        None
    } else {
        Some((triggers, body))
    }
}

/// Renders triggers and a body back into definition-line form.
pub fn format_line(triggers: &[String], body: &str) -> String {
    let head = match triggers {
        [single] => single.clone(),
        many => format!("[{}]", many.join(",")),
    };
    if body.is_empty() {
        head
    } else {
        format!("{head} {body}")
    }
}

/// Parses a definition line into one preset per trigger.
pub fn parse_line(line: &str, parser: &FlagParser) -> Result<Vec<Preset>, BananaError> {
    let (triggers, body) = split_line(line)
        .ok_or_else(|| BananaError::Config(format!("preset line `{line}` has no trigger")))?;
    let parsed = parser.parse(body);
    let params = ParamValues::from_flags(&parsed.flags).map_err(|e| {
        BananaError::Config(format!("preset `{}`: {e}", triggers.join(",")))
    })?;
    Ok(triggers
        .into_iter()
        .map(|trigger| Preset {
            trigger,
            prompt: parsed.text.clone(),
            params: params.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_trigger_line() {
        let presets = parse_line("bnt {{user_text}} --min_images 0", &FlagParser::default()).unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].trigger, "bnt");
        assert_eq!(presets[0].prompt, "{{user_text}}");
        assert_eq!(presets[0].params.min_images, Some(0));
        assert!(presets[0].has_placeholder());
    }

    #[test]
    fn multi_trigger_line_shares_parameters() {
        let presets = parse_line(
            "[手办化, figure] make a figurine --gather_mode true",
            &FlagParser::default(),
        )
        .unwrap();
        let triggers: Vec<_> = presets.iter().map(|p| p.trigger.as_str()).collect();
        assert_eq!(triggers, vec!["手办化", "figure"]);
        assert!(presets.iter().all(|p| p.params.gather_mode == Some(true)));
        assert!(presets.iter().all(|p| p.prompt == "make a figurine"));
    }

    #[test]
    fn bad_flag_in_definition_is_config_error() {
        let err = parse_line("bnt draw --max_images lots", &FlagParser::default()).unwrap_err();
        assert!(matches!(err, BananaError::Config(msg) if msg.contains("max_images")));
    }

    #[test]
    fn empty_trigger_rejected() {
        assert!(split_line("[] body").is_none());
        assert!(split_line("   ").is_none());
    }

    #[test]
    fn format_round_trips_shape() {
        assert_eq!(format_line(&["a".into()], "draw"), "a draw");
        assert_eq!(format_line(&["a".into(), "b".into()], "draw"), "[a,b] draw");
        assert_eq!(format_line(&["a".into()], ""), "a");
    }

    #[test]
    fn legacy_placeholders_substitute() {
        assert_eq!(substitute("x {{text}} y {{input}}", "cat"), "x cat y cat");
        assert!(contains_placeholder("draw {{input}}"));
        assert!(!contains_placeholder("draw {user_text}"));
    }

    #[test]
    fn details_list_declared_params() {
        let presets =
            parse_line("bna figurine --gather_mode --ar 3:4", &FlagParser::default()).unwrap();
        // `--ar` is not aliased here, so only gather_mode is declared.
        assert_eq!(presets[0].details(), "figurine\ngather_mode: true");
    }
}
