// src/batch.rs
//
// Batch orchestration over the artifact state machine: bounded retries with
// capped linear backoff per record, then either a strictly sequential walk
// over one shared session or a bounded worker pool where every worker
// authenticates its own session. A record that exhausts its attempts becomes
// a failure result; the batch itself never aborts.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::artifact::fetch_process_pdf;
use crate::config::Settings;
use crate::error::Result;
use crate::model::{ArtifactOptions, ArtifactResult, Process, RetryPolicy};
use crate::progress::Progress;
use crate::session::Session;

/// Builds a fresh authenticated session for one parallel worker.
pub type SessionFactory<'a> = &'a (dyn Fn() -> Result<Session> + Sync);

/// Drive `attempt_fn` under the retry policy, producing one immutable
/// result. Recoverable errors are retried with backoff; anything else stops
/// immediately. `attempt_fn` receives the 1-based attempt number.
pub fn run_with_retry<F>(process: &Process, policy: &RetryPolicy, mut attempt_fn: F) -> ArtifactResult
where
    F: FnMut(u32) -> Result<PathBuf>,
{
    let start = Instant::now();
    let total = policy.attempts.max(1);
    let mut path = None;
    let mut error: Option<String> = None;
    let mut attempts_made = 0;

    for attempt in 1..=total {
        attempts_made = attempt;
        match attempt_fn(attempt) {
            Ok(p) => {
                path = Some(p);
                error = None;
                break;
            }
            Err(e) => {
                error = Some(e.to_string());
                warn!("[PDF] failure {attempt}/{total} for {}: {e}", process.number);
                if !e.is_recoverable() || attempt == total {
                    break;
                }
                std::thread::sleep(policy.delay_after(attempt));
            }
        }
    }

    let success = path.is_some() && error.is_none();
    ArtifactResult {
        process: process.clone(),
        success,
        path,
        error,
        attempts: attempts_made,
        elapsed: start.elapsed(),
    }
}

/// Full open→generate→download flow for one record with retries.
pub fn download_one(
    session: &Session,
    settings: &Settings,
    process: &Process,
    policy: &RetryPolicy,
    out_dir: Option<&Path>,
) -> ArtifactResult {
    run_with_retry(process, policy, |attempt| {
        info!("[PDF] ({attempt}/{}) {}", policy.attempts.max(1), process.number);
        fetch_process_pdf(session, settings, process, out_dir)
    })
}

/// Generate the PDF of a single record, one attempt only.
pub fn generate_pdf(
    session: &Session,
    settings: &Settings,
    process: &Process,
    out_dir: Option<&Path>,
) -> ArtifactResult {
    let policy = RetryPolicy { attempts: 1, ..Default::default() };
    download_one(session, settings, process, &policy, out_dir)
}

/// Run the state machine over many records. Sequential mode preserves input
/// order and paces requests; parallel mode spreads records over `workers`
/// threads, each with its own authenticated session, and returns results in
/// completion order.
pub fn download_batch(
    session: &Session,
    settings: &Settings,
    processes: &[Process],
    options: &ArtifactOptions,
    make_session: SessionFactory<'_>,
    mut progress: Option<&mut dyn Progress>,
) -> Vec<ArtifactResult> {
    if processes.is_empty() {
        warn!("no processes available for batch PDF download");
        return Vec::new();
    }

    let targets: Vec<Process> = match options.limit {
        Some(n) if n > 0 => processes.iter().take(n).cloned().collect(),
        _ => processes.to_vec(),
    };

    let out_dir = options.out_dir.as_deref();
    if let Some(dir) = out_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("could not create {}: {e}", dir.display());
        }
    }

    info!(
        "starting batch download of {} process(es){}",
        targets.len(),
        if options.parallel { " (parallel)" } else { "" },
    );
    if let Some(p) = progress.as_deref_mut() {
        p.begin(targets.len());
    }

    let start = Instant::now();
    let results = if options.parallel {
        run_parallel(settings, &targets, options, make_session)
    } else {
        run_sequential(session, settings, &targets, options, progress.as_deref_mut())
    };

    let successes = results.iter().filter(|r| r.success).count();
    let failures: Vec<&ArtifactResult> = results.iter().filter(|r| !r.success).collect();
    info!(
        "batch finished: {successes} ok, {} failed. Total time: {:.1}s",
        failures.len(),
        start.elapsed().as_secs_f64(),
    );
    if !failures.is_empty() {
        warn!("PDF generation failed for {} process(es):", failures.len());
        for failure in failures.iter().take(5) {
            warn!(
                "  - {} ({})",
                failure.process.number,
                failure.error.as_deref().unwrap_or("unknown reason"),
            );
        }
    }
    if let Some(p) = progress.as_deref_mut() {
        p.finish();
    }

    results
}

fn run_sequential(
    session: &Session,
    settings: &Settings,
    targets: &[Process],
    options: &ArtifactOptions,
    mut progress: Option<&mut (dyn Progress + '_)>,
) -> Vec<ArtifactResult> {
    let mut results = Vec::with_capacity(targets.len());
    for (idx, process) in targets.iter().enumerate() {
        info!("[PDF] process {}/{}: {}", idx + 1, targets.len(), process.number);
        let result = download_one(session, settings, process, &options.retry, options.out_dir.as_deref());
        if let Some(p) = progress.as_deref_mut() {
            p.item_done(&result.process.number, result.success);
        }
        results.push(result);
        if idx + 1 < targets.len() {
            // pace sequential requests so the portal isn't hammered
            std::thread::sleep(Duration::from_secs(1));
        }
    }
    results
}

fn run_parallel(
    settings: &Settings,
    targets: &[Process],
    options: &ArtifactOptions,
    make_session: SessionFactory<'_>,
) -> Vec<ArtifactResult> {
    warn!("parallel mode authenticates a fresh session per worker");

    let queue: Mutex<VecDeque<Process>> = Mutex::new(targets.iter().cloned().collect());
    let results: Mutex<Vec<ArtifactResult>> = Mutex::new(Vec::with_capacity(targets.len()));
    let workers = options.workers.max(1).min(targets.len());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                let session = make_session();
                loop {
                    let Some(process) = queue.lock().unwrap().pop_front() else { break };
                    let result = match &session {
                        Ok(s) => download_one(
                            s,
                            settings,
                            &process,
                            &options.retry,
                            options.out_dir.as_deref(),
                        ),
                        Err(e) => ArtifactResult {
                            process: process.clone(),
                            success: false,
                            path: None,
                            error: Some(format!("worker session unavailable: {e}")),
                            attempts: 0,
                            elapsed: Duration::ZERO,
                        },
                    };
                    results.lock().unwrap().push(result);
                }
            });
        }
    });

    results.into_inner().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::tests::sample_process;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn third_attempt_success_reports_three_attempts() {
        let process = sample_process();
        let mut calls = 0u32;
        let result = run_with_retry(&process, &fast_policy(3), |_| {
            calls += 1;
            if calls < 3 {
                Err(Error::Artifact(s!("transient")))
            } else {
                Ok(PathBuf::from("out.pdf"))
            }
        });
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.path.as_deref(), Some(Path::new("out.pdf")));
        assert!(result.error.is_none());
    }

    #[test]
    fn exhausted_attempts_yield_failure_without_panicking() {
        let process = sample_process();
        let result = run_with_retry(&process, &fast_policy(3), |_| {
            Err(Error::Process(s!("unreachable")))
        });
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert!(result.path.is_none());
        assert!(result.error.as_deref().unwrap_or("").contains("unreachable"));
    }

    #[test]
    fn non_recoverable_errors_stop_immediately() {
        let process = sample_process();
        let mut calls = 0u32;
        let result = run_with_retry(&process, &fast_policy(5), |_| {
            calls += 1;
            Err(Error::Login(s!("expired")))
        });
        assert!(!result.success);
        assert_eq!(calls, 1);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn attempt_numbers_are_one_based() {
        let process = sample_process();
        let mut seen = Vec::new();
        let _ = run_with_retry(&process, &fast_policy(2), |attempt| {
            seen.push(attempt);
            Err(Error::Artifact(s!("x")))
        });
        assert_eq!(seen, vec![1, 2]);
    }
}
