// src/scrape/listing.rs
//
// Turns listing-table rows into `Process` values. Rows that don't yield a
// display number and a work link are skipped without error; dedup is by the
// server-issued id, first occurrence wins.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::Settings;
use crate::core::html::{attr_ci, find_block_by_attr_ci, open_tags_ci, tag_block_ci, text_of};
use crate::model::{Category, FilterOptions, Process};
use crate::session::{absolute_url, query_param};

/// Display number, tolerant of stray spacing around the punctuation.
static RE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}\.\s?\d{2}\.\s?\d{7}\s*/\s*\d{4}\s*-\s*\d{2}\b").unwrap()
});

static RE_TOOLTIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)infraTooltipMostrar\('([^']*)',\s*'([^']*)'\)").unwrap()
});

static RE_TOOLTIP_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)infraTooltipMostrar\('([^']*)'").unwrap());

/// Collapse inconsistent spacing inside a display number.
pub fn canonical_number(txt: &str) -> String {
    static DOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.\s+").unwrap());
    static SLASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*/\s*").unwrap());
    static DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*-\s*").unwrap());

    let txt = txt.replace('\u{a0}', " ");
    let txt = DOT.replace_all(&txt, ".");
    let txt = SLASH.replace_all(&txt, "/");
    let txt = DASH.replace_all(&txt, "-");
    txt.trim().to_string()
}

/// Title and type from a status tooltip fragment.
fn parse_tooltip(onmouseover: &str) -> (Option<String>, Option<String>) {
    if let Some(caps) = RE_TOOLTIP.captures(onmouseover) {
        let title = caps.get(1).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty());
        let kind = caps.get(2).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty());
        return (title, kind);
    }
    (None, None)
}

/// All `<a>…</a>` blocks of a fragment as (open tag, full block) pairs.
fn link_blocks(fragment: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some((a, b)) = tag_block_ci(fragment, "a", pos) {
        let block = &fragment[a..b];
        let Some(open_end) = block.find('>') else { break };
        out.push((&block[..open_end + 1], block));
        pos = b;
    }
    out
}

/// Extract one `Process` from a listing row, `None` when the row isn't a
/// process row.
pub fn process_from_row(settings: &Settings, row: &str, category: Category) -> Option<Process> {
    let links = link_blocks(row);
    let (work_open, work_block) = links.iter().find(|(open, _)| {
        attr_ci(open, "href").is_some_and(|h| h.contains("acao=procedimento_trabalhar"))
    })?;

    let text = text_of(work_block);
    let title_attr = attr_ci(work_open, "title").unwrap_or_default();
    let href = attr_ci(work_open, "href").unwrap_or_default();
    let m = RE_NUMBER
        .find(&text)
        .or_else(|| RE_NUMBER.find(&title_attr))
        .or_else(|| RE_NUMBER.find(&href))?;
    let number = canonical_number(m.as_str());

    if href.is_empty() {
        return None;
    }
    let url = absolute_url(settings, &href);

    let classes = attr_ci(work_open, "class").unwrap_or_default();
    let seen = classes.contains("processoVisualizado");

    let procedure_id = query_param(&url, "id_procedimento");
    let hash = query_param(&url, "infra_hash");

    let onmouseover = attr_ci(work_open, "onmouseover").unwrap_or_default();
    let (title, kind) = parse_tooltip(&onmouseover);

    let mut assignee_name = None;
    let mut assignee_id = None;
    if let Some((open, block)) = links.iter().find(|(open, _)| {
        attr_ci(open, "href").is_some_and(|h| h.contains("acao=procedimento_atribuicao_listar"))
    }) {
        assignee_name = attr_ci(open, "title")
            .map(|t| t.replace("Atribuído para ", ""))
            .filter(|t| !t.is_empty());
        assignee_id = Some(text_of(block)).filter(|t| !t.is_empty());
    }

    let mut markers = Vec::new();
    for (open, block) in &links {
        let holds_status_icon = open_tags_ci(block, "img").into_iter().any(|(a, b)| {
            attr_ci(&block[a..b], "class").is_some_and(|c| c.contains("imagemStatus"))
        });
        if !holds_status_icon {
            continue;
        }
        if let Some(om) = attr_ci(open, "onmouseover") {
            if let Some(caps) = RE_TOOLTIP_FIRST.captures(&om) {
                let tip = caps[1].trim().to_string();
                if !tip.is_empty() {
                    markers.push(tip);
                }
            }
        }
    }

    let mut has_new_documents = false;
    let mut has_notes = false;
    for (a, b) in open_tags_ci(row, "img") {
        let src = attr_ci(&row[a..b], "src").unwrap_or_default();
        has_new_documents |= src.contains("exclamacao.svg");
        has_notes |= src.contains("anotacao");
    }

    Some(Process {
        number,
        procedure_id,
        url,
        seen,
        category,
        title,
        kind,
        assignee_name,
        assignee_id,
        markers,
        has_new_documents,
        has_notes,
        hash,
        documents: Vec::new(),
        confidential: false,
        signers: Vec::new(),
        metadata: BTreeMap::new(),
    })
}

/// Walk both listing tables of a control page. Dedup by server id; rows
/// without one are dropped.
pub fn extract_processes(settings: &Settings, html: &str) -> Vec<Process> {
    let mut out: Vec<Process> = Vec::new();
    let mut ids = std::collections::BTreeSet::new();

    for category in Category::ALL {
        let table_id = format!("tblProcessos{}", category.portal_name());
        let Some(table) = find_block_by_attr_ci(html, "table", "id", &table_id) else { continue };

        let mut pos = 0usize;
        while let Some((a, b)) = tag_block_ci(table, "tr", pos) {
            let row = &table[a..b];
            pos = b;

            let Some(open_end) = row.find('>') else { continue };
            let row_id = attr_ci(&row[..open_end + 1], "id").unwrap_or_default();
            if !row_id.starts_with('P') {
                continue;
            }

            if let Some(proc) = process_from_row(settings, row, category) {
                if !proc.procedure_id.is_empty() && ids.insert(proc.procedure_id.clone()) {
                    out.push(proc);
                } else {
                    debug!(number = %proc.number, "skipping duplicate or id-less row");
                }
            }
        }
    }

    info!(
        "extracted {} process(es) ({} Recebidos, {} Gerados)",
        out.len(),
        out.iter().filter(|p| p.category == Category::Received).count(),
        out.iter().filter(|p| p.category == Category::Generated).count(),
    );
    out
}

/// Append processes not yet present in `target`, preserving arrival order.
pub fn add_unique(target: &mut Vec<Process>, extra: Vec<Process>) {
    let mut keys: std::collections::BTreeSet<String> =
        target.iter().map(|p| p.key().to_string()).collect();
    for proc in extra {
        let key = proc.key().to_string();
        if !key.is_empty() && keys.insert(key) {
            target.push(proc);
        }
    }
}

fn matches_any(target: Option<&str>, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let haystack = target.unwrap_or("").to_lowercase();
    terms.iter().any(|t| haystack.contains(&t.to_lowercase()))
}

/// In-memory filtering over a collected process list.
pub fn apply_filters(processes: &[Process], filters: &FilterOptions) -> Vec<Process> {
    let mut result: Vec<Process> = processes.to_vec();

    if let Some(categories) = &filters.categories {
        result.retain(|p| categories.contains(&p.category));
    }
    if let Some(seen) = filters.seen {
        result.retain(|p| p.seen == seen);
    }
    if let Some(flag) = filters.with_new_documents {
        result.retain(|p| p.has_new_documents == flag);
    }
    if let Some(flag) = filters.with_notes {
        result.retain(|p| p.has_notes == flag);
    }
    if !filters.assignees.is_empty() {
        result.retain(|p| matches_any(p.assignee_name.as_deref(), &filters.assignees));
    }
    if !filters.kinds.is_empty() {
        result.retain(|p| matches_any(p.kind.as_deref(), &filters.kinds));
    }
    if !filters.markers.is_empty() {
        let terms: Vec<String> = filters.markers.iter().map(|m| m.to_lowercase()).collect();
        result.retain(|p| {
            p.markers
                .iter()
                .any(|marker| terms.iter().any(|t| marker.to_lowercase().contains(t)))
        });
    }

    result
}
