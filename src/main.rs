// src/main.rs
//
// CLI entry point: login, list with pagination, filter, optionally enrich
// with documents, then generate PDFs (batch or just the first hit).

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sei_scrape::cli::Cli;
use sei_scrape::client::SeiClient;
use sei_scrape::config::Settings;
use sei_scrape::progress::Progress;

/// Print per-record batch progress to the terminal.
struct CliProgress {
    total: usize,
    done: usize,
}

impl Progress for CliProgress {
    fn begin(&mut self, total: usize) {
        self.total = total;
    }
    fn log(&mut self, msg: &str) {
        println!("{msg}");
    }
    fn item_done(&mut self, number: &str, ok: bool) {
        self.done += 1;
        let mark = if ok { "ok" } else { "FAILED" };
        println!("[{}/{}] {number}: {mark}", self.done, self.total);
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let default_level = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    std::process::exit(run(cli, settings)?)
}

fn run(cli: Cli, settings: Settings) -> color_eyre::Result<i32> {
    let mut client = SeiClient::new(settings)?;
    client.login(None, None)?;

    let filters = cli.filter_options();
    let limits = cli.page_limits();
    let enrichment = cli.enrich_options();
    let pdf_options = cli.artifact_options();

    let (all, mut filtered) = client.collect_processes(&filters, limits)?;
    if all.is_empty() {
        return Ok(0);
    }

    if let Some(path) = &cli.export_csv {
        if !filtered.is_empty() {
            match client.export_csv(&filtered, path) {
                Ok(Some(written)) => info!("processes exported to: {}", written.display()),
                Ok(None) => {}
                Err(e) => error!("error exporting CSV: {e}"),
            }
        }
    }

    if filtered.is_empty() {
        return Ok(0);
    }

    let unseen: Vec<_> = filtered.iter().filter(|p| !p.seen).collect();
    if !unseen.is_empty() {
        info!("unseen processes within the filters: {}", unseen.len());
        for process in unseen.iter().take(5) {
            info!("  - {process}");
        }
    }

    if enrichment.collect_documents || enrichment.dump_frames {
        client.enrich_processes(&mut filtered, &enrichment);
        if enrichment.collect_documents {
            let total_documents: usize = filtered.iter().map(|p| p.documents.len()).sum();
            let average = total_documents as f64 / filtered.len() as f64;
            info!("documents collected: {total_documents} (average {average:.2} per process)");
            if enrichment.save_history {
                client.save_history(&filtered, enrichment.history_file.as_deref())?;
            }
        }
    }

    if pdf_options.enabled {
        let mut progress = CliProgress { total: 0, done: 0 };
        let results = client.download_pdfs(&filtered, &pdf_options, Some(&mut progress));
        if results.is_empty() {
            return Ok(10);
        }
        if !results.iter().any(|r| r.success) {
            error!("no PDF generated successfully in batch mode");
            return Ok(10);
        }
        info!("batch download finished");
        return Ok(0);
    }

    let first = &filtered[0];
    let result = client.generate_pdf(first, pdf_options.out_dir.as_deref());
    if result.success {
        if let Some(path) = &result.path {
            info!("PDF generated successfully! ({})", path.display());
        }
        return Ok(0);
    }

    error!("error generating PDF: {}", result.error.as_deref().unwrap_or("unknown"));
    Ok(10)
}
