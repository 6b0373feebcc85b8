// src/enrich.rs
//
// Populates processes with their document trees: open the record page, find
// the embedded tree frame, fetch it and hand the content to the tree parser.
// Per-record failures clear that record's documents and move on.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Settings;
use crate::core::html::{attr_ci, find_open_tag_by_attr_ci};
use crate::core::sanitize::sanitize_filename;
use crate::error::{Error, Result};
use crate::model::{EnrichOptions, Process};
use crate::scrape::doctree::parse_documents;
use crate::session::{absolute_url, save_html, Session};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch a process's detail page.
pub fn open_process(session: &Session, settings: &Settings, process: &Process) -> Result<String> {
    info!("opening process: {}", process.number);
    let html = session
        .get_text(&process.url, FETCH_TIMEOUT)
        .map_err(|e| Error::Process(format!("error accessing process {}: {e}", process.number)))?;
    let safe = sanitize_filename(&process.number, "processo");
    save_html(settings, &settings.debug_dir().join(format!("processo_{safe}.html")), &html);
    Ok(html)
}

/// Locate the tree frame (`iframe#ifrArvore`) inside a process page.
pub fn tree_frame_src(settings: &Settings, process_html: &str) -> Option<String> {
    let tag = find_open_tag_by_attr_ci(process_html, "iframe", "id", "ifrArvore")?;
    let src = attr_ci(tag, "src").filter(|s| !s.is_empty())?;
    Some(absolute_url(settings, &src))
}

/// Fetch the tree frame's content.
pub fn load_tree_frame(session: &Session, settings: &Settings, frame_url: &str) -> Result<String> {
    info!("loading tree frame: {frame_url}");
    let html = session
        .get_text(frame_url, FETCH_TIMEOUT)
        .map_err(|e| Error::Artifact(format!("error loading tree frame: {e}")))?;
    save_html(settings, &settings.debug_dir().join("processo_iframe.html"), &html);
    Ok(html)
}

/// Enrich `processes` in place with parsed documents, honoring the limit and
/// frame-dump options. Records past the limit get their documents cleared.
pub fn enrich_processes(
    session: &Session,
    settings: &Settings,
    processes: &mut [Process],
    options: &EnrichOptions,
) {
    if !options.collect_documents || processes.is_empty() {
        return;
    }

    let limit = match options.limit {
        Some(n) if n < 1 => {
            warn!("document-collection limit below 1 ignored");
            None
        }
        other => other,
    };
    let target_count = limit.unwrap_or(processes.len()).min(processes.len());

    info!("collecting documents for {target_count} process(es)");

    for (idx, process) in processes.iter_mut().take(target_count).enumerate() {
        let html = match open_process(session, settings, process) {
            Ok(html) => html,
            Err(e) => {
                error!("could not open process {}: {e}", process.number);
                process.documents.clear();
                continue;
            }
        };

        // a fresh parse owns these fields entirely
        process.signers.clear();
        process.confidential = false;
        process.metadata.clear();

        let Some(frame_url) = tree_frame_src(settings, &html) else {
            warn!("process {} has no tree frame", process.number);
            process.documents.clear();
            continue;
        };

        let frame_html = match load_tree_frame(session, settings, &frame_url) {
            Ok(html) => html,
            Err(e) => {
                error!("could not load tree frame of {}: {e}", process.number);
                process.documents.clear();
                continue;
            }
        };

        let documents = parse_documents(settings, &frame_html, Some(&mut *process));
        process.documents = documents;

        if options.dump_frames {
            if let Some(dir) = &options.dump_frames_dir {
                if options.dump_frames_limit.is_some_and(|max| idx + 1 > max) {
                    continue;
                }
                let safe = sanitize_filename(&process.number, "processo");
                let path = dir.join(format!("{:03}_{safe}.html", idx + 1));
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                match std::fs::write(&path, &frame_html) {
                    Ok(()) => info!("tree frame of {} saved to {}", process.number, path.display()),
                    Err(e) => error!("could not save tree frame of {}: {e}", process.number),
                }
            }
        }
    }

    for process in processes.iter_mut().skip(target_count) {
        process.documents.clear();
    }
}
