use super::envelope::{self, Namespaces};
use super::patch::{PatchOutcome, SchemaPatch};
use super::wsdl::{self, WsdlDiag};
use super::{codec, ReportJob, ReportService, SavedReport, SavedReportQuery, ServiceError};
use crate::config::Config;
use crate::credentials::Credentials;
use crate::util::redact_passwords;
use crate::xml::{self, Element};
use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info};

const SAVED_REPORT_ID_ARG: &str = "savedReportID";
const REPORT_JOB_ID_ARG: &str = "reportJobID";
const REPORT_FORMAT_ARG: &str = "reportFormat";

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport {
    fn post(&self, url: &str, soap_action: &str, body: String) -> Result<TransportResponse>;
    fn get(&self, url: &str) -> Result<TransportResponse>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.service.request_timeout_seconds))
            .user_agent(cfg.service.user_agent.clone())
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, soap_action: &str, body: String) -> Result<TransportResponse> {
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{soap_action}\""))
            .body(body)
            .send()
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status().as_u16();
        let body = resp.text().with_context(|| format!("reading response from {url}"))?;
        Ok(TransportResponse { status, body })
    }

    fn get(&self, url: &str) -> Result<TransportResponse> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status().as_u16();
        let body = resp.text().with_context(|| format!("reading response from {url}"))?;
        Ok(TransportResponse { status, body })
    }
}

pub struct SoapService<T: Transport> {
    transport: T,
    endpoint: String,
    action_prefix: String,
    ns: Namespaces,
    credentials: Credentials,
    patch: Option<SchemaPatch>,
    patch_outcomes: Vec<PatchOutcome>,
    log_envelopes: bool,
    calls: u32,
}

impl<T: Transport> SoapService<T> {
    pub fn connect(cfg: &Config, credentials: Credentials, transport: T) -> Result<Self> {
        if cfg.service.check_wsdl {
            let diag = fetch_wsdl(&transport, &cfg.wsdl_url())?;
            if !diag.ok {
                bail!(
                    "WSDL at {} does not declare: {}",
                    diag.url,
                    diag.missing.join(", ")
                );
            }
            debug!(operations = diag.operations.len(), "WSDL checked");
        }

        info!(
            "session opened endpoint={} user={}",
            cfg.service.endpoint, credentials.username
        );
        Ok(Self {
            transport,
            endpoint: cfg.service.endpoint.clone(),
            action_prefix: format!(
                "{}/{}/",
                cfg.service.namespace.trim_end_matches('/'),
                cfg.service.contract
            ),
            ns: Namespaces::from_config(&cfg.service),
            credentials,
            patch: None,
            patch_outcomes: Vec::new(),
            log_envelopes: cfg.debug.log_envelopes,
            calls: 0,
        })
    }

    pub fn close(mut self) {
        self.patch = None;
        info!("session closed after {} calls", self.calls);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn patch_outcomes(&self) -> &[PatchOutcome] {
        &self.patch_outcomes
    }

    fn operation(&self, name: &str) -> Element {
        Element::new(&self.ns.service, name)
    }

    fn arg(&self, name: &str, value: impl Into<String>) -> Element {
        Element::new(&self.ns.service, name).with_text(value)
    }

    fn call(&mut self, operation: &str, request: Element) -> Result<Element> {
        let mut env = envelope::build(&self.credentials, request);
        if operation == "RunReportJob" {
            if let Some(patch) = &self.patch {
                self.patch_outcomes = patch.apply(&mut env);
            }
        }
        let body = envelope::render(&env, &self.ns)?;
        if self.log_envelopes {
            debug!(operation, "request envelope: {}", redact_passwords(&body));
        }

        self.calls += 1;
        let action = format!("{}{}", self.action_prefix, operation);
        let resp = self
            .transport
            .post(&self.endpoint, &action, body)
            .with_context(|| format!("{operation}: request failed"))?;
        if self.log_envelopes {
            debug!(operation, status = resp.status, "response envelope: {}", resp.body);
        }

        let doc = match xml::parse(&resp.body) {
            Ok(doc) => doc,
            Err(_) if !resp.is_success() => return Err(http_error(operation, &resp).into()),
            Err(err) => return Err(err.context(format!("{operation}: response is not valid XML"))),
        };
        // Faults usually come back with HTTP 500, so look for one first.
        if let Some(fault) = doc
            .child("Body")
            .and_then(|body| envelope::fault_of(body, operation))
        {
            return Err(fault.into());
        }
        if !resp.is_success() {
            return Err(http_error(operation, &resp).into());
        }
        Ok(doc)
    }
}

fn http_error(operation: &str, resp: &TransportResponse) -> ServiceError {
    ServiceError::Http {
        operation: operation.to_string(),
        status: resp.status,
        body: resp.body.chars().take(512).collect(),
    }
}

pub fn fetch_wsdl<T: Transport>(transport: &T, url: &str) -> Result<WsdlDiag> {
    let resp = transport
        .get(url)
        .with_context(|| format!("fetching WSDL: {url}"))?;
    if !resp.is_success() {
        bail!("fetching WSDL {url}: HTTP {}", resp.status);
    }
    wsdl::inspect(url, &resp.body)
}

impl<T: Transport> ReportService for SoapService<T> {
    fn list_saved_reports(&mut self) -> Result<Vec<SavedReport>> {
        let op = "GetSavedReportList";
        let doc = self.call(op, self.operation(op))?;
        codec::decode_saved_reports(envelope::operation_result(&doc, op)?)
    }

    fn saved_report_query(&mut self, saved_report_id: i64) -> Result<SavedReportQuery> {
        let op = "GetSavedReportQuery";
        let req = self
            .operation(op)
            .with_child(self.arg(SAVED_REPORT_ID_ARG, saved_report_id.to_string()));
        let doc = self.call(op, req)?;
        codec::decode_saved_report_query(envelope::operation_result(&doc, op)?)
    }

    fn run_report_job(&mut self, job: &ReportJob) -> Result<i64> {
        let op = "RunReportJob";
        let req = self
            .operation(op)
            .with_child(codec::encode_report_job(job, &self.ns));
        let doc = self.call(op, req)?;
        let submitted = codec::decode_report_job(envelope::operation_result(&doc, op)?, op)?;
        submitted
            .report_job_id
            .ok_or_else(|| anyhow!("{op}: no ReportJobID in response"))
    }

    fn report_job(&mut self, report_job_id: i64) -> Result<ReportJob> {
        let op = "GetReportJob";
        let req = self
            .operation(op)
            .with_child(self.arg(REPORT_JOB_ID_ARG, report_job_id.to_string()));
        let doc = self.call(op, req)?;
        codec::decode_report_job(envelope::operation_result(&doc, op)?, op)
    }

    fn report_download_url(&mut self, report_job_id: i64, format: &str) -> Result<String> {
        let op = "GetReportDownloadURL";
        let req = self
            .operation(op)
            .with_child(self.arg(REPORT_JOB_ID_ARG, report_job_id.to_string()))
            .with_child(self.arg(REPORT_FORMAT_ARG, format));
        let doc = self.call(op, req)?;
        let url = envelope::operation_result(&doc, op)?.text();
        if url.is_empty() {
            return Err(ServiceError::Missing {
                operation: op.to_string(),
                element: "download URL".to_string(),
            }
            .into());
        }
        Ok(url)
    }

    fn install_patch(&mut self, patch: SchemaPatch) {
        debug!(insertions = ?patch.insertions(), "schema patch installed");
        self.patch = Some(patch);
        self.patch_outcomes.clear();
    }

    fn clear_patch(&mut self) {
        if self.patch.take().is_some() {
            debug!("schema patch cleared");
        }
    }
}
