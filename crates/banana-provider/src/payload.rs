// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request bodies for both API flavors.
//!
//! The resolver records every requested parameter; which of them reach the
//! wire is decided here by [`FieldSet::for_model`], so an unsupported field is
//! omitted instead of being rejected by the API.

use banana_core::{ApiFlavor, GenerationRequest};
use serde::Serialize;

/// Model-name prefixes whose Gemini image config accepts `aspectRatio`.
const ASPECT_RATIO_FAMILIES: &[&str] = &["gemini-2.5-flash-image", "gemini-3"];

/// Model-name prefixes that accept `imageSize` and the search tool.
const EXTENDED_FAMILIES: &[&str] = &["gemini-3"];

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Optional request fields a provider model accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldSet {
    pub aspect_ratio: bool,
    pub image_size: bool,
    pub google_search: bool,
}

impl FieldSet {
    /// Field-inclusion table keyed by flavor and model family.
    pub fn for_model(flavor: ApiFlavor, model: &str) -> Self {
        match flavor {
            ApiFlavor::OpenAi => Self::default(),
            ApiFlavor::Gemini => {
                let model = model.to_ascii_lowercase();
                let model = model.strip_prefix("models/").unwrap_or(&model);
                let extended = EXTENDED_FAMILIES.iter().any(|p| model.starts_with(p));
                Self {
                    aspect_ratio: ASPECT_RATIO_FAMILIES.iter().any(|p| model.starts_with(p)),
                    image_size: extended,
                    google_search: extended,
                }
            }
        }
    }
}

/// Switches that come from configuration rather than the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadOptions {
    /// Ask for text alongside the image.
    pub text_response: bool,
}

/// A request body in the provider's own shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Gemini(GeminiRequest),
    OpenAi(OpenAiRequest),
}

impl Payload {
    pub fn flavor(&self) -> ApiFlavor {
        match self {
            Payload::Gemini(_) => ApiFlavor::Gemini,
            Payload::OpenAi(_) => ApiFlavor::OpenAi,
        }
    }

    /// Builds the body for `flavor`/`model` from a resolved request.
    pub fn build(
        flavor: ApiFlavor,
        model: &str,
        request: &GenerationRequest,
        options: PayloadOptions,
    ) -> Self {
        let fields = FieldSet::for_model(flavor, model);
        match flavor {
            ApiFlavor::Gemini => Payload::Gemini(GeminiRequest::new(request, fields, options)),
            ApiFlavor::OpenAi => Payload::OpenAi(OpenAiRequest::new(model, request)),
        }
    }
}

// --- Gemini -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiTool {
    pub google_search: serde_json::Value,
}

impl GeminiRequest {
    fn new(request: &GenerationRequest, fields: FieldSet, options: PayloadOptions) -> Self {
        let mut parts = vec![GeminiPart::Text {
            text: request.prompt.clone(),
        }];
        parts.extend(request.images.iter().map(|img| GeminiPart::Inline {
            inline_data: InlineData {
                mime_type: img.mime_type.clone(),
                data: img.to_base64(),
            },
        }));

        let mut modalities = vec!["IMAGE".to_string()];
        if options.text_response {
            modalities.insert(0, "TEXT".to_string());
        }

        let mut image_config = ImageConfig::default();
        if fields.aspect_ratio && !request.aspect_ratio.is_default() {
            image_config.aspect_ratio = Some(request.aspect_ratio.to_string());
        }
        if fields.image_size {
            image_config.image_size = Some(request.image_size.to_string());
        }
        let image_config = (image_config != ImageConfig::default()).then_some(image_config);

        let tools = (fields.google_search && request.google_search).then(|| {
            vec![GeminiTool {
                google_search: serde_json::json!({}),
            }]
        });

        Self {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: modalities,
                image_config,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|c| SafetySetting {
                    category: (*c).to_string(),
                    threshold: "OFF".to_string(),
                })
                .collect(),
            tools,
        }
    }
}

// --- OpenAI -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub modalities: Vec<String>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: Vec<OpenAiContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl OpenAiRequest {
    fn new(model: &str, request: &GenerationRequest) -> Self {
        let mut content = vec![OpenAiContentPart::Text {
            text: request.prompt.clone(),
        }];
        content.extend(request.images.iter().map(|img| OpenAiContentPart::ImageUrl {
            image_url: ImageUrl {
                url: img.to_data_url(),
            },
        }));
        Self {
            model: model.to_string(),
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content,
            }],
            modalities: vec!["image".to_string(), "text".to_string()],
            stream: false,
        }
    }
}
