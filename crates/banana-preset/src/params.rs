// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flag tokenizer shared by preset definition lines and trigger messages.
//!
//! Text is split on whitespace. Tokens starting with `--` are flags; a known
//! flag consumes the following token as its value unless that token is itself
//! a flag. Unknown flags are dropped together with their value.

use std::collections::HashMap;

use banana_core::{AspectRatio, BananaError, ImageSize};
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Parameters a preset or an invocation can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Param {
    MinImages,
    MaxImages,
    ReferImages,
    ImageSize,
    AspectRatio,
    GoogleSearch,
    PresetAppend,
    GatherMode,
    Providers,
}

impl Param {
    /// All parameter names in canonical order.
    pub fn names() -> Vec<&'static str> {
        Param::iter().map(Param::name).collect()
    }

    /// Canonical snake_case name.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Raw value attached to a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// The flag was followed by another flag or by the end of input.
    Bare,
    Token(String),
}

/// Result of tokenizing one line: free text plus flags in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub text: String,
    pub flags: Vec<(Param, RawValue)>,
}

/// Splits text into free text and flags, honouring the configured aliases.
#[derive(Debug, Clone, Default)]
pub struct FlagParser {
    aliases: HashMap<String, String>,
}

impl FlagParser {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    fn lookup(&self, name: &str) -> Option<Param> {
        let name = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        name.parse().ok()
    }

    /// Tokenizes `text`. Nothing here fails; coercion happens in [`ParamValues::apply`].
    pub fn parse(&self, text: &str) -> ParsedLine {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut words = Vec::new();
        let mut flags = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            i += 1;
            let Some(name) = token.strip_prefix("--") else {
                words.push(token);
                continue;
            };
            let next = tokens.get(i).filter(|t| !t.starts_with("--"));
            match self.lookup(name) {
                Some(param) => {
                    let value = match next {
                        Some(value) => {
                            i += 1;
                            RawValue::Token((*value).to_string())
                        }
                        None => RawValue::Bare,
                    };
                    flags.push((param, value));
                }
                None => {
                    // Only the flag token goes; what follows stays prompt text.
                    tracing::debug!(flag = name, "ignoring unknown flag");
                }
            }
        }
        ParsedLine {
            text: words.join(" "),
            flags,
        }
    }
}

/// Parameter values set at one layer; `None` means "not set here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamValues {
    pub min_images: Option<usize>,
    pub max_images: Option<usize>,
    pub refer_images: Option<Vec<String>>,
    pub image_size: Option<ImageSize>,
    pub aspect_ratio: Option<AspectRatio>,
    pub google_search: Option<bool>,
    pub preset_append: Option<bool>,
    pub gather_mode: Option<bool>,
    pub providers: Option<Vec<String>>,
}

impl ParamValues {
    /// Coerces and applies flags in order; a repeated flag keeps the last value.
    pub fn apply(&mut self, flags: &[(Param, RawValue)]) -> Result<(), BananaError> {
        for (param, raw) in flags {
            self.set(*param, raw)?;
        }
        Ok(())
    }

    /// Builds values from parsed flags.
    pub fn from_flags(flags: &[(Param, RawValue)]) -> Result<Self, BananaError> {
        let mut values = Self::default();
        values.apply(flags)?;
        Ok(values)
    }

    /// Overlays `other` on top of `self`: every value set in `other` wins.
    pub fn overlay(&self, other: &ParamValues) -> ParamValues {
        ParamValues {
            min_images: other.min_images.or(self.min_images),
            max_images: other.max_images.or(self.max_images),
            refer_images: other
                .refer_images
                .clone()
                .or_else(|| self.refer_images.clone()),
            image_size: other.image_size.or(self.image_size),
            aspect_ratio: other
                .aspect_ratio
                .clone()
                .or_else(|| self.aspect_ratio.clone()),
            google_search: other.google_search.or(self.google_search),
            preset_append: other.preset_append.or(self.preset_append),
            gather_mode: other.gather_mode.or(self.gather_mode),
            providers: other.providers.clone().or_else(|| self.providers.clone()),
        }
    }

    /// `(name, value)` pairs for every set parameter, in canonical order.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        for param in Param::iter() {
            let value = match param {
                Param::MinImages => self.min_images.map(|v| v.to_string()),
                Param::MaxImages => self.max_images.map(|v| v.to_string()),
                Param::ReferImages => self.refer_images.as_ref().map(|v| v.join(",")),
                Param::ImageSize => self.image_size.map(|v| v.to_string()),
                Param::AspectRatio => self.aspect_ratio.as_ref().map(ToString::to_string),
                Param::GoogleSearch => self.google_search.map(|v| v.to_string()),
                Param::PresetAppend => self.preset_append.map(|v| v.to_string()),
                Param::GatherMode => self.gather_mode.map(|v| v.to_string()),
                Param::Providers => self.providers.as_ref().map(|v| v.join(",")),
            };
            if let Some(value) = value {
                out.push((param.name(), value));
            }
        }
        out
    }

    fn set(&mut self, param: Param, raw: &RawValue) -> Result<(), BananaError> {
        match param {
            Param::MinImages => self.min_images = Some(coerce_count(param, raw)?),
            Param::MaxImages => self.max_images = Some(coerce_count(param, raw)?),
            Param::ReferImages => self.refer_images = Some(coerce_list(param, raw)?),
            Param::Providers => self.providers = Some(coerce_list(param, raw)?),
            Param::ImageSize => {
                let value = token(param, raw, "one of 1K, 2K, 4K")?;
                let size = value.parse::<ImageSize>().map_err(|_| {
                    invalid(param, value, "one of 1K, 2K, 4K")
                })?;
                self.image_size = Some(size);
            }
            Param::AspectRatio => {
                let value = token(param, raw, "`default` or W:H")?;
                let ratio = value
                    .parse::<AspectRatio>()
                    .map_err(|_| invalid(param, value, "`default` or W:H"))?;
                self.aspect_ratio = Some(ratio);
            }
            Param::GoogleSearch => self.google_search = Some(coerce_bool(param, raw)?),
            Param::PresetAppend => self.preset_append = Some(coerce_bool(param, raw)?),
            Param::GatherMode => self.gather_mode = Some(coerce_bool(param, raw)?),
        }
        Ok(())
    }
}

fn invalid(param: Param, value: &str, expected: &str) -> BananaError {
    BananaError::Validation {
        flag: param.name().to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn token<'a>(param: Param, raw: &'a RawValue, expected: &str) -> Result<&'a str, BananaError> {
    match raw {
        RawValue::Token(value) => Ok(value.as_str()),
        RawValue::Bare => Err(invalid(param, "", expected)),
    }
}

fn coerce_count(param: Param, raw: &RawValue) -> Result<usize, BananaError> {
    let expected = "a non-negative integer";
    let value = token(param, raw, expected)?;
    value
        .parse::<usize>()
        .map_err(|_| invalid(param, value, expected))
}

fn coerce_bool(param: Param, raw: &RawValue) -> Result<bool, BananaError> {
    match raw {
        RawValue::Bare => Ok(true),
        RawValue::Token(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        RawValue::Token(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        RawValue::Token(value) => Err(invalid(param, value, "true or false")),
    }
}

fn coerce_list(param: Param, raw: &RawValue) -> Result<Vec<String>, BananaError> {
    let value = token(param, raw, "a comma-separated list")?;
    Ok(value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}
