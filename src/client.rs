// src/client.rs
//
// High-level facade over the portal: owns the settings and the one shared
// session, threads both explicitly through every operation. Batch parallel
// mode never shares this session — workers authenticate their own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::auth;
use crate::batch;
use crate::config::Settings;
use crate::enrich;
use crate::error::{Error, Result};
use crate::model::{
    ArtifactOptions, ArtifactResult, EnrichOptions, FilterOptions, PageLimits, Process,
};
use crate::progress::Progress;
use crate::scrape::{listing, paging};
use crate::session::Session;
use crate::store;

#[derive(Clone)]
struct Credentials {
    user: String,
    password: String,
}

pub struct SeiClient {
    settings: Settings,
    session: Session,
    credentials: Option<Credentials>,
    control_html: Option<String>,
    control_url: Option<String>,
}

impl SeiClient {
    pub fn new(settings: Settings) -> Result<Self> {
        let session = Session::new(&settings)?;
        Ok(Self {
            settings,
            session,
            credentials: None,
            control_html: None,
            control_url: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Authenticate and open the process control page. Credentials default
    /// to the `SEI_USER` / `SEI_PASS` environment variables.
    pub fn login(&mut self, user: Option<&str>, password: Option<&str>) -> Result<()> {
        let user = user
            .map(str::to_string)
            .or_else(|| std::env::var("SEI_USER").ok())
            .unwrap_or_default();
        let password = password
            .map(str::to_string)
            .or_else(|| std::env::var("SEI_PASS").ok())
            .unwrap_or_default();
        if user.is_empty() || password.is_empty() {
            return Err(Error::Login(s!("set SEI_USER and SEI_PASS for authentication")));
        }

        let post_login = auth::login(&self.session, &self.settings, &user, &password)?;
        let (control_html, control_url) = auth::open_control(&self.session, &self.settings, &post_login)?;

        self.credentials = Some(Credentials { user, password });
        self.control_html = Some(control_html);
        self.control_url = Some(control_url);
        Ok(())
    }

    fn ensure_login(&self) -> Result<(&str, &str)> {
        match (&self.control_html, &self.control_url) {
            (Some(html), Some(url)) => Ok((html, url)),
            _ => Err(Error::Login(s!("authenticate before running this operation"))),
        }
    }

    /// Collect every listed process (bounded by `limits`) and apply the
    /// in-memory filters. Returns `(all, filtered)`.
    pub fn collect_processes(
        &self,
        filters: &FilterOptions,
        limits: PageLimits,
    ) -> Result<(Vec<Process>, Vec<Process>)> {
        let (control_html, control_url) = self.ensure_login()?;

        let all = paging::collect_with_pagination(
            &self.session,
            &self.settings,
            control_html,
            control_url,
            limits,
        );
        if all.is_empty() {
            warn!("no processes found");
            return Ok((all, Vec::new()));
        }

        let mut filtered = listing::apply_filters(&all, filters);
        match filters.limit {
            Some(n) if n < 1 => warn!("limit must be >= 1; ignoring"),
            Some(n) => {
                filtered.truncate(n);
                info!("applied limit of {n} process(es)");
            }
            None => {}
        }

        if filtered.len() != all.len() {
            info!("processes after filters: {}", filtered.len());
        }
        if filtered.is_empty() {
            warn!("no processes left after filters");
        }

        Ok((all, filtered))
    }

    /// Populate documents and related metadata for the given processes.
    pub fn enrich_processes(&self, processes: &mut [Process], options: &EnrichOptions) {
        if !options.collect_documents && !options.dump_frames {
            return;
        }
        let mut options = options.clone();
        if options.dump_frames && options.dump_frames_dir.is_none() {
            options.dump_frames_dir = Some(self.settings.frames_dir());
        }
        enrich::enrich_processes(&self.session, &self.settings, processes, &options);
    }

    /// Generate the PDF of a single process, one attempt.
    pub fn generate_pdf(&self, process: &Process, out_dir: Option<&Path>) -> ArtifactResult {
        batch::generate_pdf(&self.session, &self.settings, process, out_dir)
    }

    /// Batch-generate PDFs per the options. Parallel workers authenticate
    /// their own sessions with the credentials captured at login.
    pub fn download_pdfs(
        &self,
        processes: &[Process],
        options: &ArtifactOptions,
        progress: Option<&mut dyn Progress>,
    ) -> Vec<ArtifactResult> {
        if !options.enabled {
            info!("batch download disabled; nothing to do");
            return Vec::new();
        }

        let settings = self.settings.clone();
        let credentials = self.credentials.clone();
        let make_session = move || -> Result<Session> {
            let Some(creds) = &credentials else {
                return Err(Error::Login(s!("no stored credentials for worker session")));
            };
            let session = Session::new(&settings)?;
            auth::login(&session, &settings, &creds.user, &creds.password)?;
            Ok(session)
        };

        batch::download_batch(
            &self.session,
            &self.settings,
            processes,
            options,
            &make_session,
            progress,
        )
    }

    pub fn save_history(&self, processes: &[Process], path: Option<&Path>) -> Result<PathBuf> {
        store::save_history(&self.settings, processes, path)
    }

    pub fn load_history(&self, path: Option<&Path>) -> BTreeMap<String, Process> {
        store::load_history(&self.settings, path)
    }

    pub fn export_csv(&self, processes: &[Process], path: &Path) -> Result<Option<PathBuf>> {
        store::export_csv(processes, path)
    }
}
