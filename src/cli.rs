// src/cli.rs
//
// Command-line definitions and the builders that turn parsed flags into the
// option values the pipeline consumes.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::model::{
    ArtifactOptions, Category, EnrichOptions, FilterOptions, PageLimits, RetryPolicy,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CategoryArg {
    Recebidos,
    Gerados,
}

impl From<CategoryArg> for Category {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Recebidos => Category::Received,
            CategoryArg::Gerados => Category::Generated,
        }
    }
}

/// Lists SEI processes, collects their document trees and generates PDFs.
#[derive(Debug, Parser)]
#[command(name = "sei_scrape", version, about)]
pub struct Cli {
    /// Config file (defaults to ./sei_scrape.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep only processes already seen
    #[arg(long, conflicts_with = "unseen")]
    pub seen: bool,

    /// Keep only processes not yet seen
    #[arg(long)]
    pub unseen: bool,

    /// Restrict to a listing category (repeatable)
    #[arg(long = "category", value_enum)]
    pub categories: Vec<CategoryArg>,

    /// Filter by responsible party (substring, repeatable)
    #[arg(long = "assignee")]
    pub assignees: Vec<String>,

    /// Filter by process type (substring, repeatable)
    #[arg(long = "kind")]
    pub kinds: Vec<String>,

    /// Filter by status marker (substring, repeatable)
    #[arg(long = "marker")]
    pub markers: Vec<String>,

    /// Keep only processes flagged with new documents
    #[arg(long)]
    pub with_new_documents: bool,

    /// Keep only processes with side annotations
    #[arg(long)]
    pub with_notes: bool,

    /// Cap the filtered process count
    #[arg(long)]
    pub limit: Option<usize>,

    /// Export the filtered listing to a CSV file or directory
    #[arg(long, value_name = "PATH")]
    pub export_csv: Option<PathBuf>,

    /// Page ceiling for the Recebidos listing
    #[arg(long)]
    pub pages_received: Option<u32>,

    /// Page ceiling for the Gerados listing
    #[arg(long)]
    pub pages_generated: Option<u32>,

    /// Page ceiling applied to every category
    #[arg(long)]
    pub pages_max: Option<u32>,

    /// Collect document metadata for each process
    #[arg(long)]
    pub collect_documents: bool,

    /// Cap the number of processes enriched with documents
    #[arg(long)]
    pub documents_limit: Option<usize>,

    /// Dump fetched tree frames to disk
    #[arg(long)]
    pub dump_frames: bool,

    /// Cap the number of dumped tree frames
    #[arg(long)]
    pub dump_frames_limit: Option<usize>,

    /// Save the collected processes to the JSON history
    #[arg(long)]
    pub save_history: bool,

    /// History file path (defaults under the data directory)
    #[arg(long, value_name = "FILE")]
    pub history_file: Option<PathBuf>,

    /// Batch-generate PDFs for every filtered process
    #[arg(long)]
    pub download_pdfs: bool,

    /// Cap the number of processes in the PDF batch
    #[arg(long)]
    pub pdf_limit: Option<usize>,

    /// Output directory for generated PDFs
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Run the PDF batch with parallel workers (one session each)
    #[arg(long)]
    pub parallel: bool,

    /// Worker count for parallel mode
    #[arg(long, default_value_t = 3)]
    pub workers: usize,

    /// Attempts per process in the PDF batch
    #[arg(long, default_value_t = 3)]
    pub attempts: u32,
}

impl Cli {
    pub fn filter_options(&self) -> FilterOptions {
        let seen = if self.seen {
            Some(true)
        } else if self.unseen {
            Some(false)
        } else {
            None
        };
        let categories = if self.categories.is_empty() {
            None
        } else {
            Some(self.categories.iter().map(|&c| c.into()).collect())
        };
        FilterOptions {
            seen,
            categories,
            assignees: self.assignees.clone(),
            kinds: self.kinds.clone(),
            markers: self.markers.clone(),
            with_new_documents: self.with_new_documents.then_some(true),
            with_notes: self.with_notes.then_some(true),
            limit: self.limit,
        }
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            max_pages_received: self.pages_received,
            max_pages_generated: self.pages_generated,
            max_pages_total: self.pages_max,
        }
    }

    pub fn enrich_options(&self) -> EnrichOptions {
        EnrichOptions {
            collect_documents: self.collect_documents,
            limit: self.documents_limit,
            dump_frames: self.dump_frames,
            dump_frames_limit: self.dump_frames_limit,
            dump_frames_dir: None,
            save_history: self.save_history,
            history_file: self.history_file.clone(),
        }
    }

    pub fn artifact_options(&self) -> ArtifactOptions {
        ArtifactOptions {
            enabled: self.download_pdfs,
            limit: self.pdf_limit,
            out_dir: self.out_dir.clone(),
            parallel: self.parallel,
            workers: self.workers,
            retry: RetryPolicy { attempts: self.attempts.max(1), ..Default::default() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_flags_map_to_tristate() {
        let cli = Cli::parse_from(["sei_scrape", "--unseen"]);
        assert_eq!(cli.filter_options().seen, Some(false));

        let cli = Cli::parse_from(["sei_scrape"]);
        assert_eq!(cli.filter_options().seen, None);
    }

    #[test]
    fn categories_collect_into_filter() {
        let cli = Cli::parse_from(["sei_scrape", "--category", "recebidos"]);
        assert_eq!(cli.filter_options().categories, Some(vec![Category::Received]));
    }

    #[test]
    fn attempts_never_drop_below_one() {
        let cli = Cli::parse_from(["sei_scrape", "--download-pdfs", "--attempts", "0"]);
        assert_eq!(cli.artifact_options().retry.attempts, 1);
    }
}
