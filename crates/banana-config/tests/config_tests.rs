// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Banana configuration system.

use banana_config::diagnostic::ConfigError;
use banana_config::model::BananaConfig;
use banana_config::{
    GatherConflictPolicy, load_and_validate_path, load_and_validate_str, load_config_from_str,
};
use banana_core::{ApiFlavor, ImageSize};

/// A realistic configuration with every section deserializes.
#[test]
fn full_config_deserializes() {
    let toml = r#"
presets = [
    "bnt {{user_text}} --min_images 0",
    "[bna,bnb] turn this into a figurine --gather_mode true",
]
params_alias = ["ar:aspect_ratio", "p:providers"]

[common]
timeout_secs = 120
max_retry = 2
smart_retry = false
text_response = true
proxy = "http://127.0.0.1:7890"
log_level = "debug"
progress_notice = ""

[defaults]
min_images = 0
max_images = 4
aspect_ratio = "16:9"
image_size = "2K"
google_search = true

[[providers]]
name = "gemini-primary"
api_type = "gemini"
model = "gemini-3-pro-image-preview"
keys = ["AIza-one", "AIza-two"]
stream = true
timeout_secs = 90
max_payload_bytes = 10485760

[[providers]]
name = "openrouter"
api_type = "openai"
base_url = "https://openrouter.ai/api/v1/chat/completions"
model = "google/gemini-2.5-flash-image"
keys = ["sk-or"]
enabled = false

[whitelist]
group_enabled = true
groups = ["g1"]

[prefix]
prefixes = ["/"]
coexist = true

[gather]
timeout_secs = 30
start_words = ["开始", "go"]
cancel_words = ["取消", "stop"]
conflict = "extend"

[preference]
skip_self_mention = false
skip_quoted_mention = true

[admin]
ids = ["admin-1"]

[storage]
refer_images_dir = "/srv/banana/refer"
save_dir = "/srv/banana/out"
save_images = true
"#;

    let config = load_and_validate_str(toml).expect("valid config should validate");
    assert_eq!(config.common.timeout_secs, 120);
    assert!(!config.common.smart_retry);
    assert!(config.common.progress_notice.is_empty());
    assert_eq!(config.defaults.max_images, 4);
    assert_eq!(config.defaults.image_size, ImageSize::TwoK);
    assert_eq!(config.defaults.aspect_ratio.as_str(), "16:9");
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[0].api_type, ApiFlavor::Gemini);
    assert_eq!(config.providers[0].max_payload_bytes, Some(10 * 1024 * 1024));
    assert_eq!(config.enabled_provider_names(), vec!["gemini-primary"]);
    assert_eq!(config.presets.len(), 2);
    assert_eq!(config.gather.conflict, GatherConflictPolicy::Extend);
    assert_eq!(config.gather.start_words, vec!["开始", "go"]);
    assert!(!config.preference.skip_self_mention);
    assert_eq!(config.admin.ids, vec!["admin-1"]);
    assert!(config.storage.save_images);
}

/// Missing optional sections use defaults without error.
#[test]
fn empty_config_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    assert_eq!(config.common.timeout_secs, 300);
    assert_eq!(config.common.max_retry, 3);
    assert!(config.common.smart_retry);
    assert_eq!(config.common.log_level, "info");
    assert_eq!(config.defaults.min_images, 1);
    assert_eq!(config.defaults.max_images, 6);
    assert!(config.defaults.aspect_ratio.is_default());
    assert_eq!(config.defaults.image_size, ImageSize::OneK);
    assert!(config.providers.is_empty());
    assert_eq!(config.gather.timeout_secs, 60);
    assert_eq!(config.gather.cancel_words, vec!["取消"]);
    assert_eq!(config.gather.conflict, GatherConflictPolicy::Reject);
    assert!(config.preference.skip_self_mention);
    assert!(!config.storage.save_images);
}

/// Dotted overrides (what the env provider produces) win over TOML.
#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: BananaConfig = Figment::new()
        .merge(Serialized::defaults(BananaConfig::default()))
        .merge(Toml::string("[gather]\ntimeout_secs = 30\n"))
        .merge(("gather.timeout_secs", 5))
        .extract()
        .expect("should merge override");

    assert_eq!(config.gather.timeout_secs, 5);
}

/// Unknown key produces a suggestion and lists the valid keys.
#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[gather]
timout_secs = 30
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "timout_secs"
                && suggestion.as_deref() == Some("timeout_secs")
                && valid_keys.contains("cancel_words")
        })
    });
    assert!(found, "expected UnknownKey with suggestion, got: {errors:?}");
}

/// Unknown top-level section is rejected by deny_unknown_fields.
#[test]
fn unknown_top_level_section_rejected() {
    let err = load_config_from_str("[logging]\nlevel = \"debug\"\n")
        .expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("logging"),
        "got: {err_str}"
    );
}

/// Bad enum values surface as diagnostics rather than panics.
#[test]
fn invalid_image_size_rejected() {
    let errors = load_and_validate_str("[defaults]\nimage_size = \"8K\"\n")
        .expect_err("8K is not a resolution tier");
    assert!(!errors.is_empty());
}

/// Semantic validation runs after a successful parse.
#[test]
fn semantic_errors_reported_after_parse() {
    let toml = r#"
[defaults]
min_images = 5
max_images = 2
"#;
    let errors = load_and_validate_str(toml).expect_err("min > max must fail");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("min_images"))
    }));
}

/// Loading from an explicit file path works and validates.
#[test]
fn load_from_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("banana.toml");
    std::fs::write(
        &path,
        "presets = [\"bnt {{user_text}}\"]\n[admin]\nids = [\"root\"]\n",
    )
    .expect("write config");

    let config = load_and_validate_path(&path).expect("file config should validate");
    assert_eq!(config.presets, vec!["bnt {{user_text}}"]);
    assert_eq!(config.admin.ids, vec!["root"]);
}

/// ConfigError renders through miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "timout_secs".to_string(),
        suggestion: Some("timeout_secs".to_string()),
        valid_keys: "timeout_secs, start_words".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("timout_secs"));
}
