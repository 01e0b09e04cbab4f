// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared builders for requests, providers, and images.

use std::sync::Arc;
use std::time::Duration;

use banana_core::{
    ApiFlavor, AspectRatio, GenerationRequest, ImageData, ImageSize, ProviderSelection,
    SelectionOrigin,
};
use banana_provider::{ImageBackend, PayloadOptions, ProviderDispatcher, ProviderSpec, RetryPolicy};
use secrecy::SecretString;

/// Smallest byte string that sniffs as PNG.
pub fn png() -> ImageData {
    ImageData::new("image/png", vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

/// PNG tagged with `marker` so tests can tell images apart.
pub fn tagged_png(marker: u8) -> ImageData {
    let mut image = png();
    image.data.push(marker);
    image
}

/// An enabled provider with one key and a 30 second timeout.
pub fn provider_spec(name: &str, flavor: ApiFlavor) -> ProviderSpec {
    ProviderSpec {
        name: name.to_string(),
        flavor,
        base_url: "http://127.0.0.1:9".to_string(),
        model: "gemini-3-pro-image-preview".to_string(),
        keys: vec![SecretString::from(format!("{name}-key"))],
        stream: false,
        enabled: true,
        timeout: Duration::from_secs(30),
        max_payload_bytes: None,
    }
}

/// A dispatcher over Gemini-flavored `names` that answers through `backend`.
pub fn mock_dispatcher(names: &[&str], backend: Arc<dyn ImageBackend>) -> ProviderDispatcher {
    let specs = names
        .iter()
        .map(|name| provider_spec(name, ApiFlavor::Gemini))
        .collect();
    ProviderDispatcher::new(
        specs,
        RetryPolicy {
            max_retry: 1,
            smart_retry: true,
        },
        PayloadOptions::default(),
    )
    .with_backend(backend)
}

/// A direct request with no image requirement.
pub fn request(trigger: &str, prompt: &str, providers: &[&str]) -> GenerationRequest {
    GenerationRequest {
        trigger: trigger.to_string(),
        prompt: prompt.to_string(),
        images: Vec::new(),
        aspect_ratio: AspectRatio::default(),
        image_size: ImageSize::default(),
        google_search: false,
        providers: ProviderSelection {
            names: providers.iter().map(|p| p.to_string()).collect(),
            origin: SelectionOrigin::Invocation,
        },
        min_images: 0,
        max_images: 6,
        refer_images: Vec::new(),
        gather_mode: false,
    }
}
