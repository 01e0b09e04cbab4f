// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function-tool entry point for LLM agents.
//!
//! An agent can list preset names, read a preset's prompt, and generate from
//! a refined prompt that keeps a preset's parameters. Generation runs through
//! the same resolve, assemble and dispatch path as chat triggers; see
//! [`Orchestrator::handle_tool`](crate::Orchestrator::handle_tool).

use banana_core::BananaError;
use serde::{Deserialize, Serialize};

/// Name the tool is registered under.
pub const TOOL_NAME: &str = "banana_image_generation";

/// Description handed to the model alongside the schema.
pub const TOOL_DESCRIPTION: &str = "Generates images from a text prompt, optionally with reference \
images. Reference images must be attached to the current message or the message it replies to; \
avatars are fetched automatically for @-mentioned users or the sender. To use a preset, first \
fetch its prompt with get_preset, refine it, then call again with prompt and preset_name set.";

/// One tool call, decoded from the model's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    /// Generate from `prompt`, using the named preset's parameters when given.
    Generate {
        preset: Option<String>,
        prompt: String,
    },
    /// Return a preset's prompt text for the model to refine.
    GetPreset { name: String },
    /// Return every preset name.
    ListPresets,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolArguments {
    prompt: String,
    preset_name: String,
    get_preset: bool,
    get_preset_name_list: bool,
}

impl ToolRequest {
    /// Decodes the model's JSON arguments. Listing wins over lookup, and
    /// lookup wins over generation.
    pub fn from_input(input: serde_json::Value) -> Result<Self, BananaError> {
        let args: ToolArguments = serde_json::from_value(input)
            .map_err(|e| BananaError::Internal(format!("malformed tool arguments: {e}")))?;
        let preset = args.preset_name.trim().to_string();
        if args.get_preset_name_list {
            return Ok(Self::ListPresets);
        }
        if args.get_preset {
            return Ok(Self::GetPreset { name: preset });
        }
        Ok(Self::Generate {
            preset: (!preset.is_empty()).then_some(preset),
            prompt: args.prompt,
        })
    }
}

/// JSON Schema for the tool's arguments.
pub fn parameters_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "prompt": {
                "type": "string",
                "description": "Clear, detailed image prompt refined from the user's request"
            },
            "preset_name": {
                "type": "string",
                "description": "Preset whose parameters apply; keep it when the prompt was refined from that preset"
            },
            "get_preset": {
                "type": "boolean",
                "description": "Return the prompt of preset_name instead of generating"
            },
            "get_preset_name_list": {
                "type": "boolean",
                "description": "Return all preset names, for when the user's preset name looks wrong"
            }
        },
        "required": []
    })
}

/// Text returned to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    /// Whether the model should treat the call as failed.
    pub is_error: bool,
}

impl ToolOutput {
    pub(crate) fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub(crate) fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_arguments_mean_generation_without_preset() {
        assert_eq!(
            ToolRequest::from_input(json!({})).unwrap(),
            ToolRequest::Generate {
                preset: None,
                prompt: String::new()
            }
        );
    }

    #[test]
    fn listing_takes_precedence() {
        let req = ToolRequest::from_input(json!({
            "get_preset_name_list": true,
            "get_preset": true,
            "preset_name": "bnt",
            "prompt": "a cat"
        }))
        .unwrap();
        assert_eq!(req, ToolRequest::ListPresets);
    }

    #[test]
    fn lookup_before_generation() {
        let req = ToolRequest::from_input(json!({"get_preset": true, "preset_name": " fig "})).unwrap();
        assert_eq!(req, ToolRequest::GetPreset { name: "fig".into() });
    }

    #[test]
    fn generation_keeps_preset_name() {
        let req = ToolRequest::from_input(json!({"preset_name": "fig", "prompt": "a red figure"})).unwrap();
        assert_eq!(
            req,
            ToolRequest::Generate {
                preset: Some("fig".into()),
                prompt: "a red figure".into()
            }
        );
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = ToolRequest::from_input(json!({"get_preset": "yes"})).unwrap_err();
        assert!(matches!(err, BananaError::Internal(m) if m.contains("malformed tool arguments")));
    }

    #[test]
    fn schema_names_every_argument() {
        let schema = parameters_schema();
        let props = schema["properties"].as_object().unwrap();
        for key in ["prompt", "preset_name", "get_preset", "get_preset_name_list"] {
            assert!(props.contains_key(key), "{key}");
        }
    }
}
