// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `banana check` command implementation.
//!
//! Runs offline checks against a loaded configuration: provider keys,
//! preset parsing, storage directories, and access lists.

use std::io::IsTerminal;
use std::path::Path;

use banana_config::BananaConfig;
use banana_core::BananaError;
use banana_preset::PresetStore;

/// Status of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Runs every check and prints a summary. Fails when any check fails.
pub async fn run_check(config: &BananaConfig, plain: bool) -> Result<(), BananaError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = collect_checks(config).await;

    println!();
    println!("  banana check");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in &results {
        match result.status {
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
            CheckStatus::Pass => {}
        }
        println!("{}", render_line(result, use_color));
    }

    println!("  {}", "-".repeat(50));
    println!(
        "  {} passed, {warn_count} warning(s), {fail_count} failure(s)",
        results.len() - warn_count - fail_count
    );
    println!();

    if fail_count > 0 {
        return Err(BananaError::Config(format!("{fail_count} check(s) failed")));
    }
    Ok(())
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red()),
        };
        format!("    {symbol} {:<14} {message}", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<14} {}", result.name, result.message)
    }
}

pub async fn collect_checks(config: &BananaConfig) -> Vec<CheckResult> {
    vec![
        check_providers(config),
        check_presets(config),
        check_reference_dir(&config.storage.refer_images_path()).await,
        check_save_dir(config).await,
        check_access(config),
    ]
}

fn check_providers(config: &BananaConfig) -> CheckResult {
    let enabled: Vec<_> = config.providers.iter().filter(|p| p.enabled).collect();
    if enabled.is_empty() {
        return CheckResult::new("providers", CheckStatus::Fail, "no enabled provider");
    }
    let keys: usize = enabled.iter().map(|p| p.keys.len()).sum();
    let names = enabled
        .iter()
        .map(|p| format!("{} ({})", p.name, p.api_type))
        .collect::<Vec<_>>()
        .join(", ");
    CheckResult::new(
        "providers",
        CheckStatus::Pass,
        format!("{names}; {keys} key(s)"),
    )
}

fn check_presets(config: &BananaConfig) -> CheckResult {
    match PresetStore::from_config(config) {
        Ok(store) if store.triggers().is_empty() => {
            CheckResult::new("presets", CheckStatus::Warn, "no presets configured")
        }
        Ok(store) => {
            let triggers = store.triggers();
            let gather = triggers
                .iter()
                .filter_map(|t| store.get(t))
                .filter(|p| p.params.gather_mode == Some(true))
                .count();
            CheckResult::new(
                "presets",
                CheckStatus::Pass,
                format!("{} trigger(s), {gather} in gather mode", triggers.len()),
            )
        }
        Err(e) => CheckResult::new("presets", CheckStatus::Fail, e.to_string()),
    }
}

async fn check_reference_dir(dir: &Path) -> CheckResult {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => CheckResult::new(
            "reference dir",
            CheckStatus::Pass,
            dir.display().to_string(),
        ),
        Ok(_) => CheckResult::new(
            "reference dir",
            CheckStatus::Fail,
            format!("{} is not a directory", dir.display()),
        ),
        Err(_) => CheckResult::new(
            "reference dir",
            CheckStatus::Warn,
            format!("{} not found; refer_images will fail", dir.display()),
        ),
    }
}

async fn check_save_dir(config: &BananaConfig) -> CheckResult {
    if !config.storage.save_images {
        return CheckResult::new("save dir", CheckStatus::Pass, "saving disabled");
    }
    let dir = config.storage.save_path();
    let marker = dir.join(".banana-write-check");
    let outcome = async {
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&marker, b"ok").await?;
        tokio::fs::remove_file(&marker).await
    }
    .await;
    match outcome {
        Ok(()) => CheckResult::new("save dir", CheckStatus::Pass, dir.display().to_string()),
        Err(e) => CheckResult::new(
            "save dir",
            CheckStatus::Fail,
            format!("{} is not writable: {e}", dir.display()),
        ),
    }
}

fn check_access(config: &BananaConfig) -> CheckResult {
    let wl = &config.whitelist;
    if (wl.user_enabled && wl.users.is_empty()) || (wl.group_enabled && wl.groups.is_empty()) {
        return CheckResult::new(
            "access",
            CheckStatus::Warn,
            "an enabled whitelist is empty and blocks everyone",
        );
    }
    if config.admin.ids.is_empty() {
        return CheckResult::new(
            "access",
            CheckStatus::Warn,
            "no admin ids; preset and whitelist commands are disabled",
        );
    }
    CheckResult::new(
        "access",
        CheckStatus::Pass,
        format!("{} admin(s)", config.admin.ids.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> BananaConfig {
        banana_config::load_and_validate_str(&format!(
            r#"
presets = ["bnn {{{{user_text}}}}", "bna --gather_mode true"]

[[providers]]
name = "primary"
api_type = "gemini"
keys = ["a", "b"]
{extra}"#
        ))
        .unwrap()
    }

    fn status_of<'a>(results: &'a [CheckResult], name: &str) -> &'a CheckResult {
        results.iter().find(|r| r.name == name).unwrap()
    }

    #[tokio::test]
    async fn healthy_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        let results = collect_checks(&config(&format!(
            "[admin]\nids = [\"root\"]\n[storage]\nrefer_images_dir = {:?}\n",
            dir.path().display().to_string()
        )))
        .await;
        assert!(results.iter().all(|r| r.status == CheckStatus::Pass), "{results:?}");
        assert_eq!(
            status_of(&results, "presets").message,
            "2 trigger(s), 1 in gather mode"
        );
        assert!(status_of(&results, "providers").message.contains("2 key(s)"));
    }

    #[tokio::test]
    async fn missing_reference_dir_warns() {
        let results = collect_checks(&config(
            "[storage]\nrefer_images_dir = \"/nonexistent/banana-refs\"\n",
        ))
        .await;
        assert_eq!(status_of(&results, "reference dir").status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn empty_whitelist_warns() {
        let results = collect_checks(&config("[whitelist]\nuser_enabled = true\n")).await;
        assert_eq!(status_of(&results, "access").status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn save_dir_is_checked_for_writes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let results = collect_checks(&config(&format!(
            "[storage]\nsave_images = true\nsave_dir = {:?}\n",
            target.display().to_string()
        )))
        .await;
        assert_eq!(status_of(&results, "save dir").status, CheckStatus::Pass);
        assert!(target.is_dir());
    }

    #[test]
    fn plain_rendering_has_tags() {
        let line = render_line(
            &CheckResult::new("presets", CheckStatus::Warn, "none"),
            false,
        );
        assert!(line.contains("[WARN]"));
    }
}
