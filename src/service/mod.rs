pub mod codec;
pub mod envelope;
pub mod patch;
pub mod soap;
pub mod types;
pub mod wsdl;

use anyhow::Result;

pub use patch::{ElementInsertion, PatchOutcome, SchemaPatch};
pub use soap::{HttpTransport, SoapService, Transport, TransportResponse};
pub use types::{
    JobStatus, QueryParameter, ReportJob, ReportQueryDefinition, SavedReport, SavedReportQuery,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{operation} fault {code}: {message}")]
    Fault {
        operation: String,
        code: String,
        message: String,
    },

    #[error("{operation} returned HTTP {status}: {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation} response has no <{element}>")]
    Missing { operation: String, element: String },
}

pub trait ReportService {
    fn list_saved_reports(&mut self) -> Result<Vec<SavedReport>>;
    fn saved_report_query(&mut self, saved_report_id: i64) -> Result<SavedReportQuery>;
    fn run_report_job(&mut self, job: &ReportJob) -> Result<i64>;
    fn report_job(&mut self, report_job_id: i64) -> Result<ReportJob>;
    fn report_download_url(&mut self, report_job_id: i64, format: &str) -> Result<String>;
    fn install_patch(&mut self, patch: SchemaPatch);
    fn clear_patch(&mut self);
}
