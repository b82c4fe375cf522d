use crate::{
    config::Config,
    download,
    poll::{self, PollPolicy, Waiter},
    report::RunSummary,
    selection::{select_report, ReportSelector},
    service::{
        envelope::RUN_REPORT_QUERY_PATH, ReportJob, ReportService, SavedReport, SavedReportQuery,
        SchemaPatch,
    },
    util::{hash_file, now_rfc3339},
    window::{self, DateWindow},
};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use time::Date;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Bootstrap,
    Discovery,
    Submission,
    Polling,
    Download,
}

impl Stage {
    pub fn failed(self) -> String {
        format!("{self} failed")
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Bootstrap => "bootstrap",
            Stage::Discovery => "discovery",
            Stage::Submission => "submission",
            Stage::Polling => "polling",
            Stage::Download => "download",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub selector: ReportSelector,
    pub today: Date,
    pub output: PathBuf,
    pub format: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreparedJob {
    pub saved_report: SavedReport,
    pub query: SavedReportQuery,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub parameters_rewritten: usize,
}

pub struct ReportFetcher<S: ReportService> {
    cfg: Config,
    service: S,
    http: Client,
}

impl<S: ReportService> ReportFetcher<S> {
    pub fn new(cfg: &Config, service: S, http: Client) -> Self {
        Self {
            cfg: cfg.clone(),
            service,
            http,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn into_service(self) -> S {
        self.service
    }

    pub fn list(&mut self) -> Result<Vec<SavedReport>> {
        let reports = self
            .service
            .list_saved_reports()
            .with_context(|| "listing saved reports")?;
        for r in &reports {
            info!("Name: {}, ID: {}", r.name, r.saved_report_id);
        }
        Ok(reports)
    }

    pub fn prepare(&mut self, selector: &ReportSelector, today: Date) -> Result<PreparedJob> {
        let reports = self.list()?;
        let saved_report = select_report(&reports, selector)?.clone();
        info!(
            "selected saved report {} ({})",
            saved_report.saved_report_id, saved_report.name
        );

        let mut query = self
            .service
            .saved_report_query(saved_report.saved_report_id)
            .with_context(|| {
                format!("fetching query of saved report {}", saved_report.saved_report_id)
            })?;

        let mut window_start = None;
        let mut window_end = None;
        let mut parameters_rewritten = 0;
        if self.cfg.window.enabled {
            let w = DateWindow::from_config(&self.cfg.window, today)?;
            parameters_rewritten = window::rewrite_parameters(
                &mut query.report_query,
                &w,
                &self.cfg.window.start_parameter,
                &self.cfg.window.end_parameter,
            );
            info!(
                "date window {} .. {} ({parameters_rewritten} parameters rewritten)",
                w.start_str(),
                w.end_str()
            );
            window_start = Some(w.start_str());
            window_end = Some(w.end_str());
        }

        Ok(PreparedJob {
            saved_report,
            query,
            window_start,
            window_end,
            parameters_rewritten,
        })
    }

    pub fn submit(&mut self, prepared: &PreparedJob) -> Result<i64> {
        let report_query = &prepared.query.report_query;
        if let Some(patch) = SchemaPatch::from_config(
            &self.cfg.patch,
            &RUN_REPORT_QUERY_PATH,
            &self.cfg.service.types_namespace,
            report_query,
        ) {
            self.service.install_patch(patch);
        }

        let job = ReportJob::new(report_query.clone());
        let submitted = self.service.run_report_job(&job);
        self.service.clear_patch();

        let job_id = submitted?;
        info!("report job {job_id} submitted");
        Ok(job_id)
    }

    pub fn run<W: Waiter>(&mut self, opts: &RunOptions, waiter: &mut W) -> Result<RunSummary> {
        let started = now_rfc3339();

        let prepared = self
            .prepare(&opts.selector, opts.today)
            .with_context(|| Stage::Discovery.failed())?;
        debug!(?prepared, "prepared job");

        let job_id = self
            .submit(&prepared)
            .with_context(|| Stage::Submission.failed())?;

        let policy = PollPolicy::from_config(&self.cfg.poll);
        let outcome = poll::wait_for_completion(&mut self.service, job_id, &policy, waiter)
            .with_context(|| Stage::Polling.failed())?;

        let bytes = self
            .download(job_id, &opts.format, &opts.output)
            .with_context(|| Stage::Download.failed())?;

        let sha256 = if self.cfg.output.hash_output {
            Some(hash_file(&opts.output)?)
        } else {
            None
        };

        Ok(RunSummary {
            saved_report: prepared.saved_report,
            report_job_id: job_id,
            window_start: prepared.window_start,
            window_end: prepared.window_end,
            parameters_rewritten: prepared.parameters_rewritten,
            polls: outcome.polls,
            format: opts.format.clone(),
            output: opts.output.clone(),
            bytes,
            sha256,
            started,
            finished: now_rfc3339(),
        })
    }

    fn download(&mut self, job_id: i64, format: &str, dest: &std::path::Path) -> Result<u64> {
        let url = self
            .service
            .report_download_url(job_id, format)
            .with_context(|| format!("requesting {format} download URL for job {job_id}"))?;
        download::download_to_file(&self.http, &url, dest, self.cfg.download.chunk_size)
    }
}
