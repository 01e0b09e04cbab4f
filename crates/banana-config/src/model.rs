// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Banana image generation engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use banana_core::{ApiFlavor, AspectRatio, ImageSize};
use serde::{Deserialize, Serialize};

/// Top-level Banana configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BananaConfig {
    /// Request behaviour shared by every provider.
    #[serde(default)]
    pub common: CommonConfig,

    /// Global prompt parameter defaults, layered under preset values.
    #[serde(default)]
    pub defaults: PromptDefaults,

    /// Image generation providers in declaration order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Preset definition lines: `<trigger|[t1,t2]> <prompt> [--flag value]...`.
    #[serde(default)]
    pub presets: Vec<String>,

    /// Flag aliases as `alias:param` entries.
    #[serde(default)]
    pub params_alias: Vec<String>,

    /// Group and user access lists.
    #[serde(default)]
    pub whitelist: WhitelistConfig,

    /// Wake prefixes.
    #[serde(default)]
    pub prefix: PrefixConfig,

    /// Gather mode settings.
    #[serde(default)]
    pub gather: GatherConfig,

    /// Mention handling preferences.
    #[serde(default)]
    pub preference: PreferenceConfig,

    /// Administrator identities.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Reference and output image directories.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Request behaviour shared by every provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommonConfig {
    /// Default per-provider request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per API key before moving to the next key.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Retry only statuses that are likely to succeed on a second attempt.
    #[serde(default = "default_true")]
    pub smart_retry: bool,

    /// Ask providers for a text part alongside the image.
    #[serde(default)]
    pub text_response: bool,

    /// Append user text to presets that have no placeholder.
    #[serde(default)]
    pub preset_append: bool,

    /// HTTP(S) proxy URL for provider requests.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Notice sent before dispatch. Empty disables it.
    #[serde(default = "default_progress_notice")]
    pub progress_notice: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retry: default_max_retry(),
            smart_retry: true,
            text_response: false,
            preset_append: false,
            proxy: None,
            log_level: default_log_level(),
            progress_notice: default_progress_notice(),
        }
    }
}

impl CommonConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retry() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress_notice() -> String {
    "🎨 Drawing, please wait...".to_string()
}

/// Global prompt parameter defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromptDefaults {
    #[serde(default = "default_min_images")]
    pub min_images: usize,

    #[serde(default = "default_max_images")]
    pub max_images: usize,

    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    #[serde(default)]
    pub image_size: ImageSize,

    #[serde(default)]
    pub google_search: bool,

    /// Reference image file names applied to every preset.
    #[serde(default)]
    pub refer_images: Vec<String>,

    #[serde(default)]
    pub gather_mode: bool,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            min_images: default_min_images(),
            max_images: default_max_images(),
            aspect_ratio: AspectRatio::default(),
            image_size: ImageSize::default(),
            google_search: false,
            refer_images: Vec::new(),
            gather_mode: false,
        }
    }
}

fn default_min_images() -> usize {
    1
}

fn default_max_images() -> usize {
    6
}

/// One image generation provider.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique provider name referenced by presets and `--providers`.
    pub name: String,

    /// API shape the provider speaks.
    pub api_type: ApiFlavor,

    /// Endpoint override; flavor default when absent.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_provider_model")]
    pub model: String,

    /// API keys, rotated per request.
    #[serde(default)]
    pub keys: Vec<String>,

    #[serde(default)]
    pub stream: bool,

    /// Disabled providers are skipped unless named on the invocation.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-provider timeout in seconds; `common.timeout_secs` when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Largest accepted image, in bytes.
    #[serde(default)]
    pub max_payload_bytes: Option<usize>,
}

// Keys never reach Debug output.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_type", &self.api_type)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .field("stream", &self.stream)
            .field("enabled", &self.enabled)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish()
    }
}

fn default_provider_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

/// Group and user access lists. Denied messages are dropped silently.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhitelistConfig {
    #[serde(default)]
    pub group_enabled: bool,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub user_enabled: bool,

    #[serde(default)]
    pub users: Vec<String>,
}

/// Wake prefixes stripped before trigger matching.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrefixConfig {
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Accept unprefixed triggers even when prefixes are configured.
    #[serde(default)]
    pub coexist: bool,
}

/// What happens when a gather-enabled trigger arrives while a session is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatherConflictPolicy {
    /// Keep the existing session and tell the user.
    #[default]
    Reject,
    /// Treat the trigger message as ordinary gather text.
    Extend,
    /// Discard the existing session and start a new one.
    Replace,
}

impl fmt::Display for GatherConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatherConflictPolicy::Reject => "reject",
            GatherConflictPolicy::Extend => "extend",
            GatherConflictPolicy::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// Gather mode settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatherConfig {
    /// Idle time before an active session expires, in seconds.
    #[serde(default = "default_gather_timeout_secs")]
    pub timeout_secs: u64,

    /// Messages that end collection and start generation.
    #[serde(default = "default_start_words")]
    pub start_words: Vec<String>,

    /// Messages that discard the session.
    #[serde(default = "default_cancel_words")]
    pub cancel_words: Vec<String>,

    #[serde(default)]
    pub conflict: GatherConflictPolicy,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_gather_timeout_secs(),
            start_words: default_start_words(),
            cancel_words: default_cancel_words(),
            conflict: GatherConflictPolicy::default(),
        }
    }
}

impl GatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_gather_timeout_secs() -> u64 {
    60
}

fn default_start_words() -> Vec<String> {
    vec!["开始".to_string()]
}

fn default_cancel_words() -> Vec<String> {
    vec!["取消".to_string()]
}

/// Mention handling preferences.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PreferenceConfig {
    /// Skip the bot's own mention once when it was used to wake the bot.
    #[serde(default = "default_true")]
    pub skip_self_mention: bool,

    /// Skip the mention of the quoted message's sender once.
    #[serde(default)]
    pub skip_quoted_mention: bool,
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            skip_self_mention: true,
            skip_quoted_mention: false,
        }
    }
}

/// Administrator identities allowed to run admin operations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Reference and output image directories.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory searched for `refer_images` file names.
    #[serde(default = "default_refer_images_dir")]
    pub refer_images_dir: String,

    /// Directory generated images are written to when `save_images` is on.
    #[serde(default = "default_save_dir")]
    pub save_dir: String,

    #[serde(default)]
    pub save_images: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            refer_images_dir: default_refer_images_dir(),
            save_dir: default_save_dir(),
            save_images: false,
        }
    }
}

impl StorageConfig {
    pub fn refer_images_path(&self) -> PathBuf {
        PathBuf::from(&self.refer_images_dir)
    }

    pub fn save_path(&self) -> PathBuf {
        PathBuf::from(&self.save_dir)
    }
}

fn data_subdir(name: &str) -> String {
    dirs::data_dir()
        .map(|p| p.join("banana").join(name))
        .unwrap_or_else(|| PathBuf::from(name))
        .to_string_lossy()
        .into_owned()
}

fn default_refer_images_dir() -> String {
    data_subdir("refer_images")
}

fn default_save_dir() -> String {
    data_subdir("save_images")
}

impl BananaConfig {
    /// Looks up a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Enabled providers in declaration order.
    pub fn enabled_provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_debug_hides_keys() {
        let provider = ProviderConfig {
            name: "gemini-primary".into(),
            api_type: ApiFlavor::Gemini,
            base_url: None,
            model: default_provider_model(),
            keys: vec!["AIzaSecretKey".into()],
            stream: false,
            enabled: true,
            timeout_secs: None,
            max_payload_bytes: None,
        };
        let debug = format!("{provider:?}");
        assert!(!debug.contains("AIzaSecretKey"));
        assert!(debug.contains("1 redacted"));
    }

    #[test]
    fn enabled_providers_keep_declaration_order() {
        let toml_str = r#"
[[providers]]
name = "b"
api_type = "gemini"

[[providers]]
name = "off"
api_type = "openai"
enabled = false

[[providers]]
name = "a"
api_type = "OpenAI_Chat"
"#;
        let config: BananaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.enabled_provider_names(), vec!["b", "a"]);
        assert_eq!(config.provider("a").unwrap().api_type, ApiFlavor::OpenAi);
    }

    #[test]
    fn gather_conflict_policy_parses_lowercase() {
        let toml_str = r#"
[gather]
conflict = "replace"
"#;
        let config: BananaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gather.conflict, GatherConflictPolicy::Replace);
        assert_eq!(config.gather.start_words, vec!["开始"]);
        assert_eq!(config.gather.conflict.to_string(), "replace");
    }

    #[test]
    fn invalid_aspect_ratio_rejected() {
        let toml_str = r#"
[defaults]
aspect_ratio = "wide"
"#;
        assert!(toml::from_str::<BananaConfig>(toml_str).is_err());
    }
}
