// src/scrape/doctree.rs
//
// Rebuilds the document tree from the script literals embedded in the tree
// frame. The frame paints its tree through constructor calls and property
// assignments on `Nos[i]` / `NosAcoes[i]`; nothing of interest exists as
// real markup. We extract literal values only — the script is never run.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value as Json};
use tracing::debug;

use crate::config::Settings;
use crate::core::html::{first_link_href, tag_block_ci, text_of};
use crate::core::literal::{self, Value};
use crate::model::{Document, Process};
use crate::session::{absolute_url, query_param};

static RE_NODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Nos\[(?P<index>\d+)\]\s*=\s*new\s+infraArvoreNo\((?P<args>.*?)\);").unwrap()
});

static RE_MUTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)Nos\[(?P<index>\d+)\]\.(?P<prop>\w+)\s*=\s*(?P<value>'(?:\\.|[^'])*'|"(?:\\.|[^"])*"|[^;]+);"#,
    )
    .unwrap()
});

static RE_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)NosAcoes\[(?P<index>\d+)\]\s*=\s*new\s+infraArvoreAcao\((?P<args>.*?)\);")
        .unwrap()
});

/// Concatenate the bodies of every script block on the page.
fn script_text(html: &str) -> String {
    let mut out = s!();
    let mut pos = 0usize;
    while let Some((a, b)) = tag_block_ci(html, "script", pos) {
        let block = &html[a..b];
        pos = b;
        if let Some(open_end) = block.find('>') {
            if let Some(close_start) = block.rfind('<') {
                if close_start > open_end {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&block[open_end + 1..close_start]);
                }
            }
        }
    }
    out
}

/// Text of a lenient-decoded literal; booleans and `null` don't count.
fn as_text(value: &Value) -> Option<&str> {
    match value {
        Value::Str(s) | Value::Raw(s) => Some(s.as_str()),
        _ => None,
    }
}

/// Positional argument as optional text (`null` → `None`).
fn arg_text(args: &[Value], idx: usize) -> Option<String> {
    args.get(idx).and_then(Value::as_str)
}

/// Parse every document node of a tree frame, applying later property
/// mutations and action annotations. When `process` is given, actions whose
/// target is the process itself attach to it instead.
pub fn parse_documents(
    settings: &Settings,
    frame_html: &str,
    mut process: Option<&mut Process>,
) -> Vec<Document> {
    if frame_html.is_empty() {
        return Vec::new();
    }
    let script = script_text(frame_html);
    if script.trim().is_empty() {
        return Vec::new();
    }

    let mut by_index: BTreeMap<u64, Document> = BTreeMap::new();

    for caps in RE_NODE.captures_iter(&script) {
        let Ok(index) = caps["index"].parse::<u64>() else { continue };
        let args = literal::decode_args(&caps["args"]);
        if args.len() < 7 {
            continue;
        }

        let Some(kind) = arg_text(&args, 0) else { continue };
        if !kind.to_uppercase().contains("DOCUMENTO") {
            continue;
        }

        let id = arg_text(&args, 1).unwrap_or_default();
        let parent_id = arg_text(&args, 2).filter(|s| !s.is_empty());
        let href = arg_text(&args, 3).filter(|s| !s.is_empty());
        let frame_target = arg_text(&args, 4).filter(|s| !s.is_empty());
        let aux = arg_text(&args, 5).filter(|s| !s.is_empty());
        let label = arg_text(&args, 6)
            .filter(|s| !s.is_empty())
            .or(aux)
            .or_else(|| Some(id.clone()));
        let icon_path = arg_text(&args, 7).filter(|s| !s.is_empty());
        let css_class = arg_text(&args, 14).filter(|s| !s.is_empty());
        let document_number = arg_text(&args, 15).filter(|s| !s.is_empty());

        let mut doc = Document {
            id,
            parent_id: parent_id.clone(),
            title: label,
            kind: Some(kind.clone()),
            ..Default::default()
        };

        if let Some(href) = &href {
            doc.url = Some(absolute_url(settings, href));
            let hash = query_param(href, "infra_hash");
            if !hash.is_empty() {
                doc.hash = Some(hash);
            }
        }

        if let Some(number) = document_number {
            doc.metadata.insert(s!("document_number"), json!(number));
        }
        if let Some(target) = frame_target {
            doc.metadata.insert(s!("frame_target"), json!(target));
        }
        if let Some(icon) = &icon_path {
            doc.metadata.insert(s!("icon"), json!(icon));
            let slug = icon
                .rsplit('/')
                .next()
                .unwrap_or(icon)
                .split('?')
                .next()
                .unwrap_or("")
                .to_string();
            doc.metadata.insert(s!("icon_slug"), json!(slug));
            if icon.to_lowercase().contains("sigilo") {
                doc.confidential = true;
            }
        }
        if let Some(class) = &css_class {
            doc.indicators.push(class.clone());
            if class.to_lowercase().contains("novisitado") {
                doc.is_new = true;
            }
            doc.metadata.insert(s!("css_class"), json!(class));
        }
        doc.metadata.insert(s!("order"), json!(index));

        by_index.insert(index, doc);
    }

    if by_index.is_empty() {
        return Vec::new();
    }

    // id → slot lookup for action attachment; id-less nodes stay reachable
    // only by declaration order.
    let id_to_index: BTreeMap<String, u64> = by_index
        .iter()
        .filter(|(_, d)| !d.id.is_empty())
        .map(|(i, d)| (d.id.clone(), *i))
        .collect();

    apply_mutations(settings, &script, &mut by_index);
    apply_actions(&script, &mut by_index, &id_to_index, process.as_deref_mut());

    let count = by_index.len();
    debug!(
        "extracted {count} document(s) for process {}",
        process.map(|p| p.number.clone()).unwrap_or_else(|| s!("unknown"))
    );
    by_index.into_values().collect()
}

/// Apply `Nos[i].prop = value` statements to already-declared nodes. A
/// mutation on an undeclared slot has nothing to attach to and is dropped.
fn apply_mutations(settings: &Settings, script: &str, by_index: &mut BTreeMap<u64, Document>) {
    for caps in RE_MUTATION.captures_iter(script) {
        let Ok(index) = caps["index"].parse::<u64>() else { continue };
        let prop = &caps["prop"];
        if !matches!(prop, "assinatura" | "src" | "html") {
            continue;
        }
        let Some(doc) = by_index.get_mut(&index) else { continue };

        let value = literal::decode(&caps["value"]);
        let Some(text) = as_text(&value) else { continue };

        match prop {
            "assinatura" => {
                if !text.trim().is_empty() {
                    let signature = text_of(text);
                    if !signature.is_empty() {
                        doc.signed = true;
                        doc.signers = vec![signature.clone()];
                        doc.metadata.insert(s!("signature_text"), json!(signature));
                    }
                }
            }
            "src" => {
                if !text.is_empty() {
                    let abs = absolute_url(settings, text);
                    let lower = text.to_lowercase();
                    if lower.contains("documento_visualizar") {
                        doc.view_url = Some(abs);
                    } else {
                        // anything that isn't a viewer URL serves the binary
                        doc.download_url = Some(abs);
                    }
                    doc.metadata
                        .entry(s!("src_original"))
                        .or_insert_with(|| json!(text));
                }
            }
            "html" => {
                if !text.is_empty() {
                    doc.metadata.insert(s!("html_fragment"), json!(text));
                    if let Some(href) = first_link_href(text) {
                        doc.view_url = Some(absolute_url(settings, &href));
                    }
                }
            }
            _ => unreachable!(),
        }
    }
}

/// Apply `NosAcoes[i]` annotations. Argument layout: type, target id, alert
/// script, then label and icon at the tail positions.
fn apply_actions(
    script: &str,
    by_index: &mut BTreeMap<u64, Document>,
    id_to_index: &BTreeMap<String, u64>,
    mut process: Option<&mut Process>,
) {
    let mut process_signers: Vec<String> = Vec::new();

    for caps in RE_ACTION.captures_iter(script) {
        let args = literal::decode_args(&caps["args"]);
        if args.is_empty() {
            continue;
        }

        let kind = arg_text(&args, 0).unwrap_or_default().to_uppercase();
        let target_id = arg_text(&args, 1).unwrap_or_default();
        let alert_js = arg_text(&args, 2);
        let label = arg_text(&args, 5);
        let icon = arg_text(&args, 6);

        let target_slot = id_to_index.get(&target_id).copied();
        let targets_process = process
            .as_ref()
            .is_some_and(|p| !target_id.is_empty() && target_id == p.procedure_id);

        match kind.as_str() {
            "ASSINATURA" => {
                let alert = alert_js
                    .as_deref()
                    .and_then(extract_alert_text)
                    .or(label)
                    .unwrap_or_default();
                let names = extract_signer_names(&alert);

                if let Some(doc) = target_slot.and_then(|i| by_index.get_mut(&i)) {
                    if !alert.is_empty() {
                        doc.metadata
                            .entry(s!("signature_alert"))
                            .or_insert_with(|| json!(alert));
                    }
                    if !names.is_empty() {
                        doc.signed = true;
                        for name in names {
                            append_unique(&mut doc.signers, name);
                        }
                    }
                } else if targets_process {
                    let p = process.as_deref_mut().unwrap();
                    if !alert.is_empty() {
                        push_to_json_list(&mut p.metadata, "signature_alerts", &alert);
                    }
                    for name in names {
                        append_unique(&mut process_signers, name);
                    }
                }
            }
            "NIVEL_ACESSO" => {
                let alert = alert_js
                    .as_deref()
                    .and_then(extract_alert_text)
                    .or(label)
                    .unwrap_or_default();

                if let Some(doc) = target_slot.and_then(|i| by_index.get_mut(&i)) {
                    doc.confidential = true;
                    if let Some(icon) = &icon {
                        push_to_json_list(&mut doc.metadata, "action_icons", icon);
                    }
                    if !alert.is_empty() {
                        doc.metadata
                            .entry(s!("access_level"))
                            .or_insert_with(|| json!(alert));
                    }
                } else if targets_process {
                    let p = process.as_deref_mut().unwrap();
                    p.confidential = true;
                    if !alert.is_empty() {
                        p.metadata
                            .entry(s!("access_level"))
                            .or_insert_with(|| json!(alert));
                    }
                }
            }
            _ => {
                if let (Some(doc), Some(icon)) =
                    (target_slot.and_then(|i| by_index.get_mut(&i)), icon)
                {
                    push_to_json_list(&mut doc.metadata, "action_icons", &icon);
                }
            }
        }
    }

    if let Some(p) = process {
        if !process_signers.is_empty() {
            p.signers = process_signers;
        }
    }
}

fn append_unique(target: &mut Vec<String>, value: String) {
    if !value.is_empty() && !target.contains(&value) {
        target.push(value);
    }
}

fn push_to_json_list(metadata: &mut BTreeMap<String, Json>, key: &str, value: &str) {
    let entry = metadata.entry(s!(key)).or_insert_with(|| json!([]));
    if let Some(list) = entry.as_array_mut() {
        list.push(json!(value));
    }
}

/// Human-readable text of the first `alert('…')` in a script fragment,
/// with the literal escape sequences unfolded.
pub fn extract_alert_text(js: &str) -> Option<String> {
    let mut from = 0usize;
    while let Some(rel) = js[from..].find("alert(") {
        let idx = from + rel + "alert(".len();
        if let Some((content, _)) = literal::quoted_at(js, idx) {
            return Some(content);
        }
        from = idx;
    }
    None
}

/// Signer names from an alert text: blocks are separated by blank lines,
/// a leading "Assinado por" label line is dropped, the first remaining line
/// is the name. Names dedupe in encounter order.
pub fn extract_signer_names(alert_text: &str) -> Vec<String> {
    static RE_BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

    let text = alert_text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut names: Vec<String> = Vec::new();
    for block in RE_BLANK.split(text).filter(|b| !b.trim().is_empty()) {
        let mut lines = block
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        if lines
            .first()
            .is_some_and(|l| l.to_lowercase().starts_with("assinado por"))
        {
            lines.remove(0);
        }
        if let Some(name) = lines.first() {
            append_unique(&mut names, name.to_string());
        }
    }

    if names.is_empty() && text.to_lowercase().starts_with("assinado por") {
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        if lines.len() > 1 {
            append_unique(&mut names, lines[1].to_string());
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_text_unfolds_escapes() {
        let js = r"alert('Assinado por\nFulano de Tal')";
        assert_eq!(extract_alert_text(js).as_deref(), Some("Assinado por\nFulano de Tal"));
        assert!(extract_alert_text("console.log('x')").is_none());
    }

    #[test]
    fn signer_names_drop_label_and_dedupe() {
        let text = "Assinado por\nFulano de Tal\n\nAssinado por\nBeltrana de Souza\n\nAssinado por\nFulano de Tal";
        assert_eq!(extract_signer_names(text), vec!["Fulano de Tal", "Beltrana de Souza"]);
    }

    #[test]
    fn signer_names_without_label_take_first_line() {
        assert_eq!(extract_signer_names("Fulana Direta"), vec!["Fulana Direta"]);
        assert!(extract_signer_names("  ").is_empty());
    }

    #[test]
    fn script_text_joins_all_blocks() {
        let html = "<script>var a = 1;</script><p>x</p><script type='text/javascript'>var b = 2;</script>";
        let text = script_text(html);
        assert!(text.contains("var a = 1;"));
        assert!(text.contains("var b = 2;"));
    }
}
