// src/core/form.rs
//
// Serializes a form block into the key/value set a browser would submit on
// an untouched page: defaults for text fields, checked-only for radio and
// checkbox, selected-or-first for selects, trimmed text for textareas.

use std::collections::BTreeMap;

use super::html::{
    attr_ci, find_open_tag_ci, has_attr_ci, inner_after_open_tag, open_tags_ci, tag_block_ci,
};
use super::sanitize::normalize_entities;

/// Browser-equivalent serialization of `form_html` (a full `<form>` block).
/// Unnamed or malformed fields are skipped silently.
pub fn serialize_form(form_html: &str) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();

    // inputs: radio/checkbox contribute only when checked
    for (a, b) in open_tags_ci(form_html, "input") {
        let tag = &form_html[a..b];
        let Some(name) = attr_ci(tag, "name").filter(|n| !n.is_empty()) else { continue };
        let kind = attr_ci(tag, "type").unwrap_or_default().to_ascii_lowercase();
        let value = attr_ci(tag, "value").unwrap_or_default();

        if kind == "radio" || kind == "checkbox" {
            if has_attr_ci(tag, "checked") {
                data.insert(name, value);
            }
        } else {
            data.insert(name, value);
        }
    }

    // selects: selected option, else first option, else empty
    let mut pos = 0usize;
    while let Some((a, b)) = tag_block_ci(form_html, "select", pos) {
        let block = &form_html[a..b];
        pos = b;
        let Some(open_end) = block.find('>') else { continue };
        let Some(name) = attr_ci(&block[..open_end + 1], "name").filter(|n| !n.is_empty()) else {
            continue;
        };

        let options = open_tags_ci(block, "option");
        let mut value = s!();
        let mut found = false;
        for &(oa, ob) in &options {
            if has_attr_ci(&block[oa..ob], "selected") {
                value = attr_ci(&block[oa..ob], "value").unwrap_or_default();
                found = true;
                break;
            }
        }
        if !found {
            if let Some(&(oa, ob)) = options.first() {
                value = attr_ci(&block[oa..ob], "value").unwrap_or_default();
            }
        }
        data.insert(name, value);
    }

    // textareas: trimmed inner text
    let mut pos = 0usize;
    while let Some((a, b)) = tag_block_ci(form_html, "textarea", pos) {
        let block = &form_html[a..b];
        pos = b;
        let Some(open_end) = block.find('>') else { continue };
        if let Some(name) = attr_ci(&block[..open_end + 1], "name").filter(|n| !n.is_empty()) {
            let text = normalize_entities(&inner_after_open_tag(block));
            data.insert(name, text.trim().to_string());
        }
    }

    inject_unchecked_radio_defaults(form_html, &mut data);
    data
}

/// For every radio group that contributed nothing (no input checked), submit
/// the value of the group's first radio — matching the portal script's own
/// pre-selection of the first visible option.
fn inject_unchecked_radio_defaults(form_html: &str, data: &mut BTreeMap<String, String>) {
    let mut first_by_name: Vec<(String, String)> = Vec::new();
    for (a, b) in open_tags_ci(form_html, "input") {
        let tag = &form_html[a..b];
        if attr_ci(tag, "type").unwrap_or_default().to_ascii_lowercase() != "radio" {
            continue;
        }
        let Some(name) = attr_ci(tag, "name").filter(|n| !n.is_empty()) else { continue };
        if !first_by_name.iter().any(|(n, _)| *n == name) {
            first_by_name.push((name, attr_ci(tag, "value").unwrap_or_default()));
        }
    }
    for (name, value) in first_by_name {
        data.entry(name).or_insert(value);
    }
}

/// `action` attribute of the form's open tag (may be relative or empty).
pub fn form_action(form_html: &str) -> String {
    form_open_attr(form_html, "action").unwrap_or_default()
}

/// `method` attribute, lowercased, defaulting to `post`.
pub fn form_method(form_html: &str) -> String {
    let m = form_open_attr(form_html, "method")
        .unwrap_or_default()
        .to_ascii_lowercase();
    if m.is_empty() { s!("post") } else { m }
}

fn form_open_attr(form_html: &str, name: &str) -> Option<String> {
    let (a, b) = find_open_tag_ci(form_html, "form", 0)?;
    attr_ci(&form_html[a..b], name)
}
