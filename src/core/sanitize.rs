// src/core/sanitize.rs

/// Expand the handful of entities the portal actually emits.
pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space { out.push(' '); prev_space = true; }
        } else { out.push(ch); prev_space = false; }
    }
    out.trim().to_string()
}

/// Collapse a process number (or any label) into a filesystem-safe stem.
pub fn sanitize_filename(name: &str, default: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_us = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() { out.push(ch); last_us = false; }
        else if !(last_us) { out.push('_'); last_us = true; }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() { default.to_string() } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_expand_amp_last() {
        assert_eq!(normalize_entities("a&amp;b&nbsp;c"), "a&b c");
        assert_eq!(normalize_entities("x&quot;y&#39;z"), "x\"y'z");
    }

    #[test]
    fn ws_collapses_runs_and_trims() {
        assert_eq!(normalize_ws("  a \t b\n\nc  "), "a b c");
    }

    #[test]
    fn filenames_collapse_punctuation() {
        assert_eq!(sanitize_filename("1500.01.0310980/2025-88", "file"), "1500_01_0310980_2025_88");
        assert_eq!(sanitize_filename("///", "file"), "file");
    }
}
