// src/scrape/paging.rs
//
// Keeps the control form in step with the server's per-category page state.
// Page metadata comes from the table caption and a set of hidden fields;
// advancing re-submits the listing's own form with only the page-selector
// fields overridden.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{error, info};

use crate::config::Settings;
use crate::core::form::{form_action, form_method, serialize_form};
use crate::core::html::{attr_ci, find_block_by_attr_ci, find_open_tag_by_attr_ci, tag_block_ci, text_of};
use crate::error::{Error, Result};
use crate::model::{Category, PageLimits, PaginationInfo, Process};
use crate::session::{absolute_url, save_html, Session};

use super::listing::{add_unique, extract_processes};

const CONTROL_FORM_ID: &str = "frmProcedimentoControlar";
const PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Total record count and items-per-page from a caption like
/// `"Recebidos - 1 a 20 de 45 registros"`.
pub fn parse_caption(text: &str) -> (u32, u32) {
    static RE_TOTAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s+registros").unwrap());
    static RE_RANGE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"-\s*(\d+)\s*a\s*(\d+)").unwrap());

    let mut total = 0u32;
    let mut per_page = 0u32;

    if let Some(caps) = RE_TOTAL.captures(text) {
        total = caps[1].parse().unwrap_or(0);
    }
    if let Some(caps) = RE_RANGE.captures(text) {
        let start: u32 = caps[1].parse().unwrap_or(0);
        let end: u32 = caps[2].parse().unwrap_or(0);
        per_page = end.saturating_sub(start) + 1;
    }
    if per_page == 0 && total > 0 {
        per_page = total;
    }
    (total, per_page)
}

fn hidden_value(html: &str, id: &str) -> Option<String> {
    find_open_tag_by_attr_ci(html, "input", "id", id).and_then(|tag| attr_ci(tag, "value"))
}

fn count_process_rows(table: &str) -> u32 {
    let mut count = 0u32;
    let mut pos = 0usize;
    while let Some((a, b)) = tag_block_ci(table, "tr", pos) {
        let row = &table[a..b];
        pos = b;
        if let Some(open_end) = row.find('>') {
            if attr_ci(&row[..open_end + 1], "id").unwrap_or_default().starts_with('P') {
                count += 1;
            }
        }
    }
    count
}

/// Pagination metadata for both categories of a control page. Total pages
/// is at least 1 even when a category lists nothing.
pub fn pagination_info(html: &str) -> BTreeMap<Category, PaginationInfo> {
    let mut info = BTreeMap::new();

    for category in Category::ALL {
        let name = category.portal_name();
        let mut total_records = 0u32;
        let mut items_per_page = 0u32;

        if let Some(table) = find_block_by_attr_ci(html, "table", "id", &format!("tblProcessos{name}")) {
            if let Some((a, b)) = tag_block_ci(table, "caption", 0) {
                (total_records, items_per_page) = parse_caption(&text_of(&table[a..b]));
            }
            let rows = count_process_rows(table);
            if items_per_page == 0 && rows > 0 {
                items_per_page = rows;
            }
            if total_records == 0 && rows > 0 {
                total_records = rows;
            }
        }

        if items_per_page == 0 {
            if let Some(n) = hidden_value(html, &format!("hdn{name}NroItens"))
                .and_then(|v| v.parse::<u32>().ok())
            {
                items_per_page = n;
            }
        }
        if total_records == 0 {
            if let Some(list) = hidden_value(html, &format!("hdn{name}Itens")) {
                total_records = list.split(',').filter(|item| !item.is_empty()).count() as u32;
            }
        }

        let current_page = hidden_value(html, &format!("hdn{name}PaginaAtual"))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        if items_per_page == 0 {
            items_per_page = total_records.max(1);
        }
        let total_pages = total_records.div_ceil(items_per_page).max(1);

        info.insert(
            category,
            PaginationInfo { total_records, current_page, total_pages, items_per_page },
        );
    }

    info
}

/// The fields and destination of one page-advance submission.
pub struct PageRequest {
    pub data: BTreeMap<String, String>,
    pub action: String,
    pub method: String,
}

/// Serialize the control form and override only the page-selector fields
/// (both duplicate selectors plus the hidden page index) with `target_page`
/// (0-based). Missing hidden field means pagination cannot be expressed.
pub fn build_page_request(current_html: &str, category: Category, target_page: u32) -> Result<PageRequest> {
    let form = find_block_by_attr_ci(current_html, "form", "id", CONTROL_FORM_ID)
        .ok_or_else(|| Error::Process(s!("control form not found for pagination")))?;

    let name = category.portal_name();
    let mut data = serialize_form(form);
    let target = target_page.to_string();

    for selector in [format!("sel{name}PaginacaoSuperior"), format!("sel{name}PaginacaoInferior")] {
        if let Some(value) = data.get_mut(&selector) {
            *value = target.clone();
        }
    }
    match data.get_mut(&format!("hdn{name}PaginaAtual")) {
        Some(value) => *value = target.clone(),
        None => return Err(Error::Process(format!("pagination unavailable for {category}"))),
    }

    Ok(PageRequest {
        data,
        action: form_action(form),
        method: form_method(form),
    })
}

/// Re-submit the control form asking for `target_page` (0-based) of one
/// category. Every other field is sent exactly as the form would submit it.
pub fn submit_page(
    session: &Session,
    settings: &Settings,
    current_html: &str,
    category: Category,
    target_page: u32,
    control_url: &str,
) -> Result<String> {
    let request = build_page_request(current_html, category, target_page)?;

    let action = absolute_url(settings, &request.action);
    let html = if request.method == "get" {
        session.get_with_params(&action, &request.data, Some(control_url), PAGE_TIMEOUT)
    } else {
        session.post_form(&action, &request.data, Some(control_url), PAGE_TIMEOUT)
    }
    .map_err(|e| Error::Process(format!("error requesting page {} of {category}: {e}", target_page + 1)))?;

    save_html(
        settings,
        &settings
            .debug_dir()
            .join(format!(
                "controle_{}_{}.html",
                category.portal_name().to_lowercase(),
                target_page + 1
            )),
        &html,
    );

    Ok(html)
}

/// Walk every page of both categories (bounded by `limits`), accumulating a
/// deduplicated process list. A pagination failure abandons that category
/// and keeps whatever was already collected.
pub fn collect_with_pagination(
    session: &Session,
    settings: &Settings,
    initial_html: &str,
    control_url: &str,
    limits: PageLimits,
) -> Vec<Process> {
    let mut processes: Vec<Process> = Vec::new();

    let info = pagination_info(initial_html);
    add_unique(&mut processes, extract_processes(settings, initial_html));

    for category in Category::ALL {
        let Some(pages) = info.get(&category) else { continue };
        let limit = limits.limit_for(category, pages.total_pages);
        let mut html = initial_html.to_string();

        for page in (pages.current_page + 1)..limit {
            info!("loading page {}/{} of {category}", page + 1, pages.total_pages);
            match submit_page(session, settings, &html, category, page, control_url) {
                Ok(next) => {
                    add_unique(&mut processes, extract_processes(settings, &next));
                    html = next;
                }
                Err(e) => {
                    error!("abandoning {category} pagination: {e}");
                    break;
                }
            }
        }
    }

    processes
}
