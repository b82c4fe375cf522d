use crate::xml::Element;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedReport {
    pub name: String,
    pub saved_report_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedReportQuery {
    pub name: String,
    pub saved_report_id: i64,
    pub report_query: ReportQueryDefinition,
}

pub const REPORT_QUERY_FIELDS: [&str; 5] = [
    "DeliveryDetailOutputColumnIDList",
    "FieldOutputColumnNameList",
    "MetricOutputColumnIDList",
    "QueryFilterList",
    "QueryParameterList",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportQueryDefinition {
    pub delivery_detail_output_column_ids: Option<Vec<String>>,
    pub field_output_column_names: Option<Vec<String>>,
    pub metric_output_column_ids: Option<Vec<String>>,
    pub query_filters: Option<Vec<Element>>,
    pub query_parameters: Option<Vec<QueryParameter>>,
}

impl ReportQueryDefinition {
    pub fn absent_fields(&self) -> Vec<(usize, &'static str)> {
        let present = [
            self.delivery_detail_output_column_ids.is_some(),
            self.field_output_column_names.is_some(),
            self.metric_output_column_ids.is_some(),
            self.query_filters.is_some(),
            self.query_parameters.is_some(),
        ];
        REPORT_QUERY_FIELDS
            .iter()
            .zip(present)
            .enumerate()
            .filter(|(_, (_, present))| !present)
            .map(|(i, (name, _))| (i, *name))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub parameter_type: String,
    pub parameter_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportJob {
    pub report_job_id: Option<i64>,
    pub report_query: ReportQueryDefinition,
    pub status: Option<String>,
    pub status_message: Option<String>,
}

impl ReportJob {
    pub fn new(report_query: ReportQueryDefinition) -> Self {
        Self {
            report_job_id: None,
            report_query,
            status: None,
            status_message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Done,
    Failed(String),
    InProgress(String),
}

impl JobStatus {
    pub fn classify(raw: &str, done: &str, failures: &[String]) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(done) {
            JobStatus::Done
        } else if failures.iter().any(|f| f.eq_ignore_ascii_case(raw)) {
            JobStatus::Failed(raw.to_string())
        } else {
            JobStatus::InProgress(raw.to_string())
        }
    }
}
