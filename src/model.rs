// src/model.rs
//
// Data model for processes, documents and the option/result types threaded
// through the pipeline. Everything that lands in the history file derives
// serde; option types are plain values built by the CLI layer.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The two mutually exclusive listing groups on the control page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Recebidos")]
    Received,
    #[serde(rename = "Gerados")]
    Generated,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Received, Category::Generated];

    /// The token the portal uses in element ids and field names.
    pub fn portal_name(self) -> &'static str {
        match self {
            Category::Received => "Recebidos",
            Category::Generated => "Gerados",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.portal_name())
    }
}

/// One entry of a process's document tree, reconstructed from the script
/// declarations embedded in the tree frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Lookup key only — a child may be declared before its parent, and a
    /// dangling parent id is a normal outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub signers: Vec<String>,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub confidential: bool,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One process as listed on the control page, optionally enriched with its
/// document tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Process {
    /// Canonical display number, `NNNN.NN.NNNNNNN/NNNN-NN`.
    pub number: String,
    /// Server-issued identifier; the identity key for dedup and history.
    pub procedure_id: String,
    pub url: String,
    pub seen: bool,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default)]
    pub has_new_documents: bool,
    #[serde(default)]
    pub has_notes: bool,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub confidential: bool,
    #[serde(default)]
    pub signers: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Process {
    /// Identity used for dedup and history keys.
    pub fn key(&self) -> &str {
        if self.procedure_id.is_empty() { &self.number } else { &self.procedure_id }
    }
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.seen { "seen" } else { "unseen" };
        write!(f, "{} ({}, {})", self.number, self.category, status)
    }
}

/// In-memory filters applied after collection.
#[derive(Clone, Debug, Default)]
pub struct FilterOptions {
    /// `Some(true)` keeps seen only, `Some(false)` unseen only.
    pub seen: Option<bool>,
    pub categories: Option<Vec<Category>>,
    pub assignees: Vec<String>,
    pub kinds: Vec<String>,
    pub markers: Vec<String>,
    pub with_new_documents: Option<bool>,
    pub with_notes: Option<bool>,
    pub limit: Option<usize>,
}

/// Page-count ceilings for the listing walk.
#[derive(Clone, Copy, Debug, Default)]
pub struct PageLimits {
    pub max_pages_received: Option<u32>,
    pub max_pages_generated: Option<u32>,
    pub max_pages_total: Option<u32>,
}

impl PageLimits {
    /// Number of pages to walk for `category` given the computed total.
    /// A ceiling below 1 degrades to 1.
    pub fn limit_for(&self, category: Category, total_pages: u32) -> u32 {
        let mut ceilings: Vec<u32> = Vec::new();
        if let Some(n) = self.max_pages_total {
            ceilings.push(n);
        }
        match category {
            Category::Received => {
                if let Some(n) = self.max_pages_received {
                    ceilings.push(n);
                }
            }
            Category::Generated => {
                if let Some(n) = self.max_pages_generated {
                    ceilings.push(n);
                }
            }
        }
        let Some(ceiling) = ceilings.into_iter().min() else {
            return total_pages;
        };
        total_pages.min(ceiling.max(1))
    }
}

/// Pagination metadata read from one listing category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PaginationInfo {
    pub total_records: u32,
    pub current_page: u32,
    pub total_pages: u32,
    pub items_per_page: u32,
}

/// Knobs for the document-enrichment pass.
#[derive(Clone, Debug, Default)]
pub struct EnrichOptions {
    pub collect_documents: bool,
    pub limit: Option<usize>,
    pub dump_frames: bool,
    pub dump_frames_limit: Option<usize>,
    pub dump_frames_dir: Option<PathBuf>,
    pub save_history: bool,
    pub history_file: Option<PathBuf>,
}

/// Bounded-retry schedule for the artifact pipeline. Delay grows linearly
/// with the attempt number and is capped.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt after `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.base_delay * attempt).min(self.max_delay)
    }
}

/// Options for single or batch PDF generation.
#[derive(Clone, Debug)]
pub struct ArtifactOptions {
    pub enabled: bool,
    pub limit: Option<usize>,
    pub out_dir: Option<PathBuf>,
    pub parallel: bool,
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for ArtifactOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: None,
            out_dir: None,
            parallel: false,
            workers: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one attempted artifact generation. Immutable once built;
/// parallel mode returns these in arbitrary order, so callers match results
/// to processes through the embedded value, not by position.
#[derive(Clone, Debug)]
pub struct ArtifactResult {
    pub process: Process,
    pub success: bool,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn page_limits_pick_smallest_ceiling() {
        let limits = PageLimits {
            max_pages_received: Some(5),
            max_pages_generated: None,
            max_pages_total: Some(3),
        };
        assert_eq!(limits.limit_for(Category::Received, 10), 3);
        assert_eq!(limits.limit_for(Category::Generated, 10), 3);
        assert_eq!(limits.limit_for(Category::Generated, 2), 2);
    }

    #[test]
    fn page_limit_below_one_degrades_to_one() {
        let limits = PageLimits { max_pages_total: Some(0), ..Default::default() };
        assert_eq!(limits.limit_for(Category::Received, 10), 1);
    }

    #[test]
    fn no_ceiling_walks_everything() {
        let limits = PageLimits::default();
        assert_eq!(limits.limit_for(Category::Received, 7), 7);
    }

    #[test]
    fn retry_delay_is_linear_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(8));
        assert_eq!(policy.delay_after(9), Duration::from_secs(10));
    }

    #[test]
    fn process_key_falls_back_to_number() {
        let mut p = sample_process();
        assert_eq!(p.key(), "PROC-1");
        p.procedure_id.clear();
        assert_eq!(p.key(), "0001.02.0000003/2025-04");
    }

    pub(crate) fn sample_process() -> Process {
        Process {
            number: s!("0001.02.0000003/2025-04"),
            procedure_id: s!("PROC-1"),
            url: s!("https://sei.example/sei/controlador.php?acao=procedimento_trabalhar&id_procedimento=PROC-1"),
            seen: false,
            category: Category::Received,
            title: None,
            kind: None,
            assignee_name: None,
            assignee_id: None,
            markers: Vec::new(),
            has_new_documents: false,
            has_notes: false,
            hash: s!(),
            documents: Vec::new(),
            confidential: false,
            signers: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}
