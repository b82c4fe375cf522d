use crate::config::Config;
use crate::service::SavedReport;
use anyhow::{bail, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum ReportSelector {
    Index(usize),
    Id(i64),
    Name(String),
}

impl Default for ReportSelector {
    fn default() -> Self {
        ReportSelector::Index(0)
    }
}

impl ReportSelector {
    pub fn from_config(cfg: &Config) -> Self {
        if let Some(id) = cfg.report.saved_report_id {
            ReportSelector::Id(id)
        } else if let Some(name) = &cfg.report.name {
            ReportSelector::Name(name.clone())
        } else {
            ReportSelector::Index(cfg.report.index)
        }
    }
}

pub fn select_report<'a>(reports: &'a [SavedReport], selector: &ReportSelector) -> Result<&'a SavedReport> {
    if reports.is_empty() {
        bail!("the service returned no saved reports");
    }
    let found = match selector {
        ReportSelector::Index(i) => reports.get(*i),
        ReportSelector::Id(id) => reports.iter().find(|r| r.saved_report_id == *id),
        ReportSelector::Name(name) => reports.iter().find(|r| r.name == *name),
    };
    match found {
        Some(r) => Ok(r),
        None => bail!(
            "no saved report matches {:?} ({} available)",
            selector,
            reports.len()
        ),
    }
}
