//! Installation diagnostics.
//!
//! Verifies that the plugin host and the plugins the chain asks for can be
//! resolved, without rendering anything.

use crate::defaults::plugin_names;
use crate::plugin::{MainVariant, PluginRegistry, resolve_existing, resolve_main};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CheckResult {
    /// Present and usable
    Ok,
    /// Not found
    NotFound,
    /// Found but has issues
    Warning(String),
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckResult::Ok)
    }
}

/// Resolution of one stable plugin name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginCheck {
    pub name: String,
    /// Which part of the chain uses it.
    pub used_by: &'static str,
    pub path: Option<PathBuf>,
    pub result: CheckResult,
}

/// Everything `vocalrender check` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub version: String,
    pub host: PathBuf,
    pub host_result: CheckResult,
    pub plugin_dir: Option<PathBuf>,
    /// `primary`, `fallback`, or `None` when no main chain resolves.
    pub main_variant: Option<&'static str>,
    pub main_path: Option<PathBuf>,
    pub known_plugins: Vec<String>,
    pub plugins: Vec<PluginCheck>,
}

impl CheckReport {
    /// A render can start: the host exists and a main chain resolves.
    pub fn can_render(&self) -> bool {
        self.host_result.is_ok() && self.main_path.is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Check whether the host path exists and looks executable.
fn check_host(host: &Path) -> CheckResult {
    if !host.exists() {
        return CheckResult::NotFound;
    }
    if host.is_dir() {
        return CheckResult::Warning(format!("{} is a directory", host.display()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(host) {
            Ok(meta) if meta.permissions().mode() & 0o111 == 0 => {
                return CheckResult::Warning(format!("{} is not executable", host.display()));
            }
            Ok(_) => {}
            Err(e) => return CheckResult::Warning(format!("Error checking host: {}", e)),
        }
    }
    CheckResult::Ok
}

fn chain_plugins() -> Vec<(String, &'static str)> {
    let mut names = vec![
        (plugin_names::MAIN.to_string(), "main chain"),
        (plugin_names::MAIN_FALLBACK.to_string(), "main chain (fallback)"),
    ];
    for index in 1..=9 {
        names.push((plugin_names::eq(index), "tone"));
    }
    for reverb in plugin_names::REVERBS {
        names.push((reverb.to_string(), "reverb"));
    }
    names.push((plugin_names::ROBOT.to_string(), "robot"));
    names.push((plugin_names::MASTER.to_string(), "master"));
    names
}

fn check_plugin(registry: &dyn PluginRegistry, name: &str, used_by: &'static str) -> PluginCheck {
    let mut candidates = vec![name];
    if name == plugin_names::REVERBS[2] {
        candidates.push(plugin_names::REVERB_LARGE_ALIAS);
    }
    let (path, result) = match resolve_existing(registry, &candidates) {
        Some(handle) => (Some(handle.plugin), CheckResult::Ok),
        None => match registry.resolve(name) {
            Some(handle) => (
                Some(handle.plugin.clone()),
                CheckResult::Warning(format!("{} does not exist", handle.plugin.display())),
            ),
            None => (None, CheckResult::NotFound),
        },
    };
    PluginCheck {
        name: name.to_string(),
        used_by,
        path,
        result,
    }
}

/// Builds the report for `registry`.
pub fn build_report(
    registry: &dyn PluginRegistry,
    plugin_dir: Option<&Path>,
    require_primary: bool,
) -> CheckReport {
    let host = registry.host().to_path_buf();
    let host_result = check_host(&host);
    let main = resolve_main(registry, require_primary);
    CheckReport {
        version: crate::version_string(),
        host,
        host_result,
        plugin_dir: plugin_dir.map(Path::to_path_buf),
        main_variant: main.as_ref().map(|(_, variant)| match variant {
            MainVariant::Primary => "primary",
            MainVariant::Fallback => "fallback",
        }),
        main_path: main.map(|(handle, _)| handle.plugin),
        known_plugins: registry.known_plugins(),
        plugins: chain_plugins()
            .into_iter()
            .map(|(name, used_by)| check_plugin(registry, &name, used_by))
            .collect(),
    }
}

fn status_mark(result: &CheckResult) -> String {
    match result {
        CheckResult::Ok => format!("{}", "✓ OK".green()),
        CheckResult::NotFound => format!("{}", "✗ NOT FOUND".red()),
        CheckResult::Warning(msg) => format!("{} {}", "⚠ WARNING:".yellow(), msg),
    }
}

/// Print the report as text.
pub fn print_report(report: &CheckReport) {
    println!("vocalrender {}", report.version);
    println!("Checking plugin installation...\n");

    println!(
        "Plugin host ({}): {}",
        report.host.display(),
        status_mark(&report.host_result)
    );
    if let Some(dir) = &report.plugin_dir {
        let mark = if dir.is_dir() {
            CheckResult::Ok
        } else {
            CheckResult::NotFound
        };
        println!("Plugin directory ({}): {}", dir.display(), status_mark(&mark));
    }
    match (&report.main_variant, &report.main_path) {
        (Some(variant), Some(path)) => {
            println!("Main chain: {} ({})", path.display(), variant);
        }
        _ => println!("Main chain: {}", "✗ NOT FOUND".red()),
    }

    println!();
    println!("Plugins:");
    for plugin in &report.plugins {
        let location = plugin
            .path
            .as_ref()
            .map(|p| format!(" {}", p.display().dimmed()))
            .unwrap_or_default();
        println!(
            "  {:<12} {:<22} {}{}",
            plugin.name,
            plugin.used_by.dimmed(),
            status_mark(&plugin.result),
            location
        );
    }

    if !report.known_plugins.is_empty() {
        println!();
        println!("Indexed bundles: {}", report.known_plugins.join(", "));
    }

    println!();
    if report.can_render() {
        println!("{}", "✓ Ready to render.".green());
    } else {
        println!("{}", "✗ Rendering is not possible until the host and main chain are found.".red());
    }
}
