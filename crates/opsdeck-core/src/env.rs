//! `KEY=VALUE` env file store.
//!
//! Files are re-read on every call. The only mutator is [`upsert_env_key`],
//! which edits a single line in place and leaves comments, ordering and
//! unrelated keys untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Flat key → value mapping loaded from an env file.
pub type EnvMap = BTreeMap<String, String>;

/// Read an env file. Missing or unreadable files yield an empty map.
pub fn read_env_file(path: &Path) -> EnvMap {
    match fs::read_to_string(path) {
        Ok(text) => parse_env(&text),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "env file unreadable");
            }
            EnvMap::new()
        }
    }
}

/// Parse env text: blank lines, `#` comments and lines without `=` are skipped.
pub fn parse_env(text: &str) -> EnvMap {
    let mut map = EnvMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.trim().to_string());
    }
    map
}

/// Set `key=value` in an env file.
///
/// Replaces the first line whose trimmed text starts with `KEY=`, or appends
/// the entry (after a blank separator line and the optional `# comment`
/// lines). Returns `true` only when the file content changed; I/O errors
/// are logged and reported as `false`.
pub fn upsert_env_key(path: &Path, key: &str, value: &str, comment: Option<&str>) -> bool {
    match try_upsert(path, key, value, comment) {
        Ok(changed) => {
            if changed {
                debug!(path = %path.display(), key, "env key updated");
            }
            changed
        }
        Err(e) => {
            warn!(path = %path.display(), key, error = %e, "env upsert failed");
            false
        }
    }
}

fn try_upsert(path: &Path, key: &str, value: &str, comment: Option<&str>) -> CoreResult<bool> {
    let key = key.trim();
    if key.is_empty() || key.contains('=') || key.contains('\n') {
        return Err(CoreError::InvalidKey(key.to_string()));
    }

    let original = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let needle = format!("{key}=");
    let entry = format!("{key}={}", value.trim());
    let mut lines: Vec<String> = original.lines().map(str::to_string).collect();

    match lines.iter().position(|l| l.trim().starts_with(&needle)) {
        Some(idx) => lines[idx] = entry,
        None => {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            for c in comment.unwrap_or_default().lines() {
                let c = c.trim();
                if !c.is_empty() {
                    lines.push(format!("# {c}"));
                }
            }
            lines.push(entry);
        }
    }

    let updated = lines.join("\n") + "\n";
    if updated == original {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, updated)?;
    Ok(true)
}

/// Trimmed value for `key`, or `default` when missing or empty.
pub fn env_str(map: &EnvMap, key: &str, default: &str) -> String {
    match map.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Boolean flag: `1/true/yes/y/on` and `0/false/no/n/off`; anything else is `default`.
pub fn env_bool(map: &EnvMap, key: &str, default: bool) -> bool {
    let Some(raw) = map.get(key) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

/// Integer clamped to `[min, max]`; unparseable values fall back to `default` first.
pub fn env_int(map: &EnvMap, key: &str, default: i64, min: i64, max: i64) -> i64 {
    let value = map
        .get(key)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default);
    value.clamp(min, max)
}

/// Parse `H:MM` / `HH:MM` into minutes since midnight.
pub fn parse_hhmm(text: &str) -> Option<u32> {
    let (h, m) = text.trim().split_once(':')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !(1..=2).contains(&h.len()) || m.len() != 2 || !digits(h) || !digits(m) {
        return None;
    }
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Parse a TCP port in `1..=65535`, else `default`.
pub fn parse_port(text: &str, default: u16) -> u16 {
    match text.trim().parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => p as u16,
        _ => default,
    }
}
