// src/store.rs
//
// Durable outputs: the JSON history (keyed by server id, documents included)
// and the CSV summary of a filtered listing.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::model::Process;

/* ---------------- JSON history ---------------- */

/// Persist processes (documents included) keyed by their server id.
pub fn save_history(settings: &Settings, processes: &[Process], path: Option<&Path>) -> Result<PathBuf> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| settings.history_path());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut data: BTreeMap<&str, &Process> = BTreeMap::new();
    for process in processes {
        let key = process.key();
        if !key.is_empty() {
            data.insert(key, process);
        }
    }

    let json = serde_json::to_string_pretty(&data)
        .map_err(|e| Error::Process(format!("could not serialize history: {e}")))?;
    std::fs::write(&path, json)?;
    info!("history saved to {} ({} process(es))", path.display(), data.len());
    Ok(path)
}

/// Load a previously saved history. Missing or malformed files degrade to an
/// empty map with a warning.
pub fn load_history(settings: &Settings, path: Option<&Path>) -> BTreeMap<String, Process> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| settings.history_path());
    if !path.exists() {
        return BTreeMap::new();
    }
    match std::fs::read_to_string(&path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(data) => data,
            Err(e) => {
                warn!("unexpected format in history {}: {e}", path.display());
                BTreeMap::new()
            }
        },
        Err(e) => {
            warn!("error loading history {}: {e}", path.display());
            BTreeMap::new()
        }
    }
}

/* ---------------- CSV export ---------------- */

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single CSV row to any writer, quoting only when needed.
pub fn write_csv_row<W: Write>(mut w: W, row: &[String]) -> std::io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first { write!(w, ",")?; } else { first = false; }
        if needs_quotes(cell) {
            let escaped = cell.replace('"', "\"\"");
            write!(w, "\"{}\"", escaped)?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

fn yes_no(value: bool) -> String {
    if value { s!("Sim") } else { s!("Não") }
}

fn summary_row(process: &Process) -> Vec<String> {
    vec![
        process.number.clone(),
        s!(process.category.portal_name()),
        yes_no(process.seen),
        process.title.clone().unwrap_or_default(),
        process.kind.clone().unwrap_or_default(),
        process.assignee_name.clone().unwrap_or_default(),
        process.assignee_id.clone().unwrap_or_default(),
        process.markers.join(", "),
        yes_no(process.has_new_documents),
        yes_no(process.has_notes),
        process.procedure_id.clone(),
        process.hash.clone(),
        process.url.clone(),
    ]
}

const CSV_HEADERS: [&str; 13] = [
    "Número do Processo",
    "Categoria",
    "Visualizado",
    "Título",
    "Tipo/Especificidade",
    "Responsável",
    "CPF Responsável",
    "Marcadores",
    "Documentos Novos",
    "Anotações",
    "ID Procedimento",
    "Hash",
    "URL",
];

/// Export a listing summary as CSV. A directory path gets a default file
/// name; any other extension is rewritten to `.csv`. Returns `None` when
/// there is nothing to export.
pub fn export_csv(processes: &[Process], path: &Path) -> Result<Option<PathBuf>> {
    if processes.is_empty() {
        info!("no processes to export");
        return Ok(None);
    }

    let mut path = path.to_path_buf();
    if path.is_dir() {
        path = path.join("processos_filtrados.csv");
    } else if path.extension().and_then(|e| e.to_str()) != Some("csv") {
        path.set_extension("csv");
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    let headers: Vec<String> = CSV_HEADERS.iter().map(|h| s!(*h)).collect();
    write_csv_row(&mut buf, &headers)?;
    for process in processes {
        write_csv_row(&mut buf, &summary_row(process))?;
    }
    std::fs::write(&path, buf)?;

    info!("CSV written: {}", path.display());
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_quote_only_when_needed() {
        let mut buf = Vec::new();
        write_csv_row(&mut buf, &[s!("plain"), s!("a,b"), s!("q\"q")]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "plain,\"a,b\",\"q\"\"q\"\n");
    }

    #[test]
    fn summary_row_is_header_shaped() {
        let process = crate::model::tests::sample_process();
        assert_eq!(summary_row(&process).len(), CSV_HEADERS.len());
    }
}
