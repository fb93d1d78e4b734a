//! Profile preferences (user.js)

use std::path::Path;

use anyhow::{Context as _, Result};
use extrun_core::{CustomPrefs, PrefValue};

const USER_JS: &str = "user.js";

/// Preferences every extrun profile needs: remote debugging on, no prompts,
/// unsigned extensions allowed, proxy installs picked up at startup.
pub fn default_prefs() -> CustomPrefs {
    let mut prefs = CustomPrefs::new();
    let mut set = |key: &str, value: PrefValue| {
        prefs.insert(key.to_string(), value);
    };

    set("devtools.debugger.remote-enabled", PrefValue::Bool(true));
    set("devtools.debugger.prompt-connection", PrefValue::Bool(false));
    set("devtools.chrome.enabled", PrefValue::Bool(true));
    set("devtools.browserconsole.contentMessages", PrefValue::Bool(true));
    set("xpinstall.signatures.required", PrefValue::Bool(false));
    set("extensions.enabledScopes", PrefValue::Int(5));
    set("extensions.autoDisableScopes", PrefValue::Int(10));
    set("extensions.update.enabled", PrefValue::Bool(false));
    set("app.update.enabled", PrefValue::Bool(false));
    set("browser.shell.checkDefaultBrowser", PrefValue::Bool(false));
    set(
        "browser.startup.homepage_override.mstone",
        PrefValue::String("ignore".to_string()),
    );
    set("browser.tabs.warnOnClose", PrefValue::Bool(false));
    set("datareporting.policy.dataSubmissionEnabled", PrefValue::Bool(false));
    set("toolkit.telemetry.enabled", PrefValue::Bool(false));
    prefs
}

fn format_value(value: &PrefValue) -> String {
    match value {
        PrefValue::Bool(b) => b.to_string(),
        PrefValue::Int(i) => i.to_string(),
        // JSON string escaping is valid JS string syntax
        PrefValue::String(s) => serde_json::Value::String(s.clone()).to_string(),
    }
}

fn pref_key(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("user_pref(\"")?;
    rest.split('"').next()
}

/// Render user.js: existing lines not overridden, then defaults merged under `custom`
pub fn render_user_js(existing: &str, custom: &CustomPrefs) -> String {
    let mut prefs = default_prefs();
    prefs.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut out = String::new();
    for line in existing.lines() {
        if pref_key(line).is_some_and(|key| prefs.contains_key(key)) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    for (key, value) in &prefs {
        out.push_str(&format!("user_pref(\"{}\", {});\n", key, format_value(value)));
    }
    out
}

/// Write merged preferences into `<profile>/user.js`
pub async fn write_prefs(profile_dir: &Path, custom: &CustomPrefs) -> Result<()> {
    let path = profile_dir.join(USER_JS);
    let existing = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };

    tokio::fs::write(&path, render_user_js(&existing, custom))
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
