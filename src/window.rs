use crate::config;
use crate::service::ReportQueryDefinition;
use anyhow::{anyhow, Context, Result};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Date,
    pub end: Date,
}

impl DateWindow {
    pub fn rolling(today: Date, start_offset_days: i64, end_offset_days: i64) -> Result<Self> {
        Ok(Self {
            start: days_before(today, start_offset_days)?,
            end: days_before(today, end_offset_days)?,
        })
    }

    pub fn from_config(cfg: &config::Window, today: Date) -> Result<Self> {
        Self::rolling(today, cfg.start_offset_days, cfg.end_offset_days)
    }

    pub fn start_str(&self) -> String {
        format_date(self.start)
    }

    pub fn end_str(&self) -> String {
        format_date(self.end)
    }
}

fn days_before(today: Date, days: i64) -> Result<Date> {
    i64::from(today.to_julian_day())
        .checked_sub(days)
        .and_then(|jd| i32::try_from(jd).ok())
        .and_then(|jd| Date::from_julian_day(jd).ok())
        .ok_or_else(|| anyhow!("{days} days before {today} is out of range"))
}

pub fn format_date(d: Date) -> String {
    let fmt = format_description!("[year]-[month]-[day]");
    d.format(&fmt)
        .unwrap_or_else(|_| format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day()))
}

pub fn parse_date(raw: &str) -> Result<Date> {
    let fmt = format_description!("[year]-[month]-[day]");
    Date::parse(raw.trim(), &fmt).with_context(|| format!("invalid date (want YYYY-MM-DD): {raw}"))
}

pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

pub fn rewrite_parameters(
    query: &mut ReportQueryDefinition,
    window: &DateWindow,
    start_type: &str,
    end_type: &str,
) -> usize {
    let Some(params) = query.query_parameters.as_mut() else {
        return 0;
    };
    let (start, end) = (window.start_str(), window.end_str());
    let mut rewritten = 0;
    for p in params.iter_mut() {
        let value = if p.parameter_type == start_type {
            &start
        } else if p.parameter_type == end_type {
            &end
        } else {
            continue;
        };
        debug!(
            "parameter {} {:?} -> {}",
            p.parameter_type, p.parameter_value, value
        );
        p.parameter_value = Some(value.clone());
        rewritten += 1;
    }
    rewritten
}
