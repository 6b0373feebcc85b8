// src/artifact.rs
//
// The generate-PDF workflow: open the record, find the tree frame, find the
// generate action, submit the options form, resolve the final download URL
// (directly or through the portal's download frame) and stream the binary.
// Each step fails with enough context for the retry loop in batch.rs; no
// step retries on its own.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::config::Settings;
use crate::core::form::{form_action, form_method, serialize_form};
use crate::core::html::{
    attr_ci, find_block_by_attr_ci, find_open_tag_by_attr_ci, open_tags_ci, tag_block_ci, text_of,
};
use crate::core::sanitize::sanitize_filename;
use crate::enrich::{load_tree_frame, open_process, tree_frame_src};
use crate::error::{Error, Result};
use crate::model::Process;
use crate::session::{absolute_url, save_html, Session};

const GENERATE_ACTION: &str = "acao=procedimento_gerar_pdf";
const DOWNLOAD_ACTION: &str = "acao=exibir_arquivo";

/// Hard ceiling on accepted downloads; beyond this the record fails.
const MAX_PDF_BYTES: u64 = 100 * 1024 * 1024;

const FORM_TIMEOUT: Duration = Duration::from_secs(60);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

static RE_GENERATE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r#"(?i)href="([^"]*{GENERATE_ACTION}[^"]+)""#)).unwrap());

static RE_DOWNLOAD_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r#"(?i)['"]([^'"]*{DOWNLOAD_ACTION}[^'"]+)['"]"#)).unwrap());

static RE_DOWNLOAD_FRAME_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)document\.getElementById\('ifrDownload'\)\.src\s*=\s*['"]([^'"]+)['"]"#).unwrap()
});

/// Locate the generate-PDF action inside the tree frame. Preference order:
/// direct link, image alt text, link title, raw pattern over the whole
/// markup (the link sometimes only exists inside script text).
pub fn find_generate_link(settings: &Settings, frame_html: &str) -> Option<String> {
    let mut pos = 0usize;
    let mut by_image = None;
    let mut by_title = None;

    while let Some((a, b)) = tag_block_ci(frame_html, "a", pos) {
        let block = &frame_html[a..b];
        pos = b;
        let Some(open_end) = block.find('>') else { continue };
        let open = &block[..open_end + 1];
        let Some(href) = attr_ci(open, "href").filter(|h| !h.is_empty()) else { continue };

        if href.contains(GENERATE_ACTION) {
            return Some(absolute_url(settings, &href));
        }
        if by_image.is_none() {
            let has_generate_img = open_tags_ci(block, "img").into_iter().any(|(ia, ib)| {
                let alt = attr_ci(&block[ia..ib], "alt").unwrap_or_default();
                alt.contains("Gerar") && alt.contains("PDF")
            });
            if has_generate_img {
                by_image = Some(absolute_url(settings, &href));
            }
        }
        if by_title.is_none() {
            let title = attr_ci(open, "title").unwrap_or_default();
            if title.contains("Gerar") && title.contains("PDF") {
                by_title = Some(absolute_url(settings, &href));
            }
        }
    }

    by_image.or(by_title).or_else(|| {
        RE_GENERATE_HREF
            .captures(frame_html)
            .map(|caps| absolute_url(settings, &caps[1]))
    })
}

/// Fetch the generation options page.
pub fn open_generate_form(session: &Session, settings: &Settings, url: &str) -> Result<String> {
    info!("opening PDF options page: {url}");
    let html = session
        .get_text(url, FORM_TIMEOUT)
        .map_err(|e| Error::Artifact(format!("error opening PDF options page: {e}")))?;
    save_html(settings, &settings.debug_dir().join("gerar_pdf_form.html"), &html);
    Ok(html)
}

/// The final URL the portal serves the PDF from, if this response exposes it.
pub fn extract_download_url(settings: &Settings, html: &str) -> Option<String> {
    if let Some(tag) = find_open_tag_by_attr_ci(html, "iframe", "id", "ifrDownload") {
        if let Some(src) = attr_ci(tag, "src") {
            if src.contains(DOWNLOAD_ACTION) {
                return Some(absolute_url(settings, &src));
            }
        }
    }
    RE_DOWNLOAD_QUOTED
        .captures(html)
        .map(|caps| absolute_url(settings, &caps[1]))
}

/// Diagnostic message the portal renders when generation fails.
pub fn extract_error_message(html: &str) -> Option<String> {
    let container = find_block_by_attr_ci(html, "div", "id", "divInfraMensagens")?;
    // start past the container's own open tag
    let mut pos = container.find('>')? + 1;
    while let Some((a, b)) = tag_block_ci(container, "div", pos) {
        let block = &container[a..b];
        pos = b;
        let Some(open_end) = block.find('>') else { continue };
        if attr_ci(&block[..open_end + 1], "class").unwrap_or_default().contains("alert") {
            let text = text_of(block);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Stream the generated binary to disk, validating content type and size.
/// `Ok(None)` means the response was not an acceptable PDF (empty body or
/// HTML served instead).
pub fn download_by_url(
    session: &Session,
    settings: &Settings,
    url: &str,
    process: &Process,
    out_dir: Option<&Path>,
) -> Result<Option<PathBuf>> {
    let base = out_dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&base)
        .map_err(|e| Error::Artifact(format!("could not create {}: {e}", base.display())))?;
    let safe = sanitize_filename(&process.number, "arquivo");
    let dest = base.join(format!("processo_{safe}.pdf"));

    info!("downloading file: {url}");
    let mut response = session
        .get_raw(url, "application/pdf, */*;q=0.8", DOWNLOAD_TIMEOUT)
        .map_err(|e| {
            if e.is_timeout() {
                Error::Artifact(s!("timeout downloading PDF"))
            } else {
                Error::Artifact(format!("network error downloading PDF: {e}"))
            }
        })?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    let content_disposition = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    if content_type.contains("application/pdf") || content_disposition.contains(".pdf") {
        let mut file = std::fs::File::create(&dest)
            .map_err(|e| Error::Artifact(format!("could not create {}: {e}", dest.display())))?;
        let mut total: u64 = 0;
        let mut buf = [0u8; 65536];
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| Error::Artifact(format!("network error downloading PDF: {e}")))?;
            if n == 0 {
                break;
            }
            std::io::Write::write_all(&mut file, &buf[..n])
                .map_err(|e| Error::Artifact(format!("could not write {}: {e}", dest.display())))?;
            total += n as u64;
            if total > MAX_PDF_BYTES {
                return Err(Error::Artifact(format!("file too large (>100MB): {total} bytes")));
            }
        }

        if total == 0 {
            warn!("downloaded file is empty");
            return Ok(None);
        }
        info!("PDF saved: {} ({:.2} KB)", dest.display(), total as f64 / 1024.0);
        return Ok(Some(dest));
    }

    // not a PDF; keep the HTML around for inspection when dumps are on
    if let Ok(text) = response.text_with_charset(crate::session::PORTAL_CHARSET) {
        save_html(settings, &settings.debug_dir().join("processo_pdf_intermediario.html"), &text);
        warn!("download did not return a PDF; HTML saved for inspection");
    } else {
        warn!("download response is neither text nor PDF; check headers/redirects");
    }
    Ok(None)
}

/// Pick the generation form on the options page: prefer one whose action or
/// submit-button label says "generate", else the first form.
fn pick_generate_form<'a>(html: &'a str) -> Option<&'a str> {
    let mut first = None;
    let mut pos = 0usize;
    while let Some((a, b)) = tag_block_ci(html, "form", pos) {
        let block = &html[a..b];
        pos = b;
        if first.is_none() {
            first = Some(block);
        }

        let action = form_action(block);
        let buttons: String = open_tags_ci(block, "input")
            .into_iter()
            .filter(|&(ia, ib)| {
                attr_ci(&block[ia..ib], "type").unwrap_or_default().eq_ignore_ascii_case("submit")
            })
            .filter_map(|(ia, ib)| attr_ci(&block[ia..ib], "value"))
            .collect::<Vec<_>>()
            .join(" ");
        if action.contains("procedimento_gerar_pdf") || buttons.contains("Gerar") {
            return Some(block);
        }
    }
    first
}

/// Submit the generation form and resolve the resulting PDF to a file.
pub fn submit_generate_form(
    session: &Session,
    settings: &Settings,
    form_page_html: &str,
    referer_url: &str,
    process: &Process,
    out_dir: Option<&Path>,
) -> Result<PathBuf> {
    let Some(form) = pick_generate_form(form_page_html) else {
        save_html(
            settings,
            &settings.debug_dir().join("processo_pdf_intermediario.html"),
            form_page_html,
        );
        return Err(Error::Artifact(s!("no form found on the PDF options page")));
    };

    let action = absolute_url(settings, &form_action(form));
    let mut data = serialize_form(form);
    data.insert(s!("hdnFlagGerar"), s!("1"));
    data.entry(s!("rdoTipo")).or_insert_with(|| s!("T"));
    data.entry(s!("btnGerar")).or_insert_with(|| s!("Gerar"));

    let html = if form_method(form) == "get" {
        session.get_with_params(&action, &data, Some(referer_url), GENERATE_TIMEOUT)
    } else {
        session.post_form(&action, &data, Some(referer_url), GENERATE_TIMEOUT)
    }
    .map_err(|e| Error::Artifact(format!("network error generating PDF: {e}")))?;

    save_html(settings, &settings.debug_dir().join("processo_pdf_intermediario.html"), &html);

    let mut download_url = extract_download_url(settings, &html);

    if download_url.is_none() {
        // the response may only wire the URL into the download frame via script
        if let Some(caps) = RE_DOWNLOAD_FRAME_ASSIGN.captures(&html) {
            let frame_url = absolute_url(settings, &caps[1]);
            info!("download frame wired via script; loading {frame_url}");
            let frame_html = session
                .get_text(&frame_url, FORM_TIMEOUT)
                .map_err(|e| Error::Artifact(format!("error loading download frame: {e}")))?;
            save_html(
                settings,
                &settings.debug_dir().join("processo_pdf_iframe_download.html"),
                &frame_html,
            );
            download_url = extract_download_url(settings, &frame_html);
            if download_url.is_none() {
                if let Some(message) = extract_error_message(&frame_html) {
                    return Err(Error::Artifact(format!("portal reported an error: {message}")));
                }
            }
        }
    }

    if let Some(url) = download_url {
        return match download_by_url(session, settings, &url, process, out_dir)? {
            Some(path) => Ok(path),
            None => Err(Error::Artifact(s!("failed to download PDF via the frame URL"))),
        };
    }

    if let Some(message) = extract_error_message(&html) {
        return Err(Error::Artifact(format!("portal reported an error: {message}")));
    }
    Err(Error::Artifact(format!("no download URL ({DOWNLOAD_ACTION}) in the response")))
}

/// One full pass of the state machine for a single process. Retrying is the
/// caller's job.
pub fn fetch_process_pdf(
    session: &Session,
    settings: &Settings,
    process: &Process,
    out_dir: Option<&Path>,
) -> Result<PathBuf> {
    let process_html = open_process(session, settings, process)?;
    let frame_url = tree_frame_src(settings, &process_html)
        .ok_or_else(|| Error::Artifact(s!("tree frame 'ifrArvore' not found")))?;
    let frame_html = load_tree_frame(session, settings, &frame_url)?;
    let link = find_generate_link(settings, &frame_html)
        .ok_or_else(|| Error::Artifact(format!("link '{GENERATE_ACTION}' not found")))?;
    let form_html = open_generate_form(session, settings, &link)?;
    submit_generate_form(session, settings, &form_html, &link, process, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            org: s!("28"),
            unit: s!("U"),
            base_url: s!("https://sei.example"),
            ..Default::default()
        }
    }

    #[test]
    fn generate_link_prefers_direct_href() {
        let html = r#"
            <a href="controlador.php?acao=outra">x</a>
            <a href="controlador.php?acao=procedimento_gerar_pdf&id=1">gerar</a>
        "#;
        assert_eq!(
            find_generate_link(&settings(), html).as_deref(),
            Some("https://sei.example/sei/controlador.php?acao=procedimento_gerar_pdf&id=1")
        );
    }

    #[test]
    fn generate_link_falls_back_to_image_then_title() {
        let by_img = r#"<a href="x.php?id=2"><img alt="Gerar arquivo PDF do processo"></a>"#;
        assert_eq!(
            find_generate_link(&settings(), by_img).as_deref(),
            Some("https://sei.example/sei/x.php?id=2")
        );

        let by_title = r#"<a href="y.php?id=3" title="Gerar PDF">g</a>"#;
        assert_eq!(
            find_generate_link(&settings(), by_title).as_deref(),
            Some("https://sei.example/sei/y.php?id=3")
        );
    }

    #[test]
    fn generate_link_raw_pattern_covers_script_text() {
        let html = r#"<script>var h = 'href="controlador.php?acao=procedimento_gerar_pdf&id=4"';</script>"#;
        let link = find_generate_link(&settings(), html).unwrap();
        assert!(link.contains("acao=procedimento_gerar_pdf&id=4"));
    }

    #[test]
    fn download_url_from_frame_or_quoted_string() {
        let via_frame = r#"<iframe id="ifrDownload" src="controlador.php?acao=exibir_arquivo&id=9"></iframe>"#;
        assert_eq!(
            extract_download_url(&settings(), via_frame).as_deref(),
            Some("https://sei.example/sei/controlador.php?acao=exibir_arquivo&id=9")
        );

        let via_script = r#"<script>abrir('controlador.php?acao=exibir_arquivo&id=10');</script>"#;
        let url = extract_download_url(&settings(), via_script).unwrap();
        assert!(url.contains("acao=exibir_arquivo&id=10"));

        assert!(extract_download_url(&settings(), "<p>nada</p>").is_none());
    }

    #[test]
    fn error_message_is_read_from_the_alert_block() {
        let html = r#"
            <div id="divInfraMensagens">
              <div class="alert alert-danger"> Processo sem documentos. </div>
            </div>
        "#;
        assert_eq!(extract_error_message(html).as_deref(), Some("Processo sem documentos."));
        assert!(extract_error_message("<div id='outra'></div>").is_none());
    }

    #[test]
    fn generation_form_is_picked_by_action_or_button() {
        let html = r#"
            <form action="a.php"><input type="submit" value="Pesquisar"></form>
            <form action="controlador.php?acao=procedimento_gerar_pdf"><input type="submit" value="Gerar"></form>
        "#;
        let form = pick_generate_form(html).unwrap();
        assert!(form.contains("procedimento_gerar_pdf"));

        let fallback = r#"<form action="unico.php"><input type="submit" value="Ok"></form>"#;
        assert!(pick_generate_form(fallback).unwrap().contains("unico.php"));
        assert!(pick_generate_form("<p>sem form</p>").is_none());
    }
}
