use super::envelope::{Namespaces, ARRAYS_NS};
use super::types::*;
use super::ServiceError;
use crate::xml::Element;
use anyhow::{Context, Result};

pub fn encode_report_query(q: &ReportQueryDefinition, ns: &Namespaces) -> Element {
    let types = ns.types.as_str();
    let mut el = Element::new(types, "ReportQuery");

    if let Some(ids) = &q.delivery_detail_output_column_ids {
        el.push(array(types, REPORT_QUERY_FIELDS[0], "int", ids));
    }
    if let Some(names) = &q.field_output_column_names {
        el.push(array(types, REPORT_QUERY_FIELDS[1], "string", names));
    }
    if let Some(ids) = &q.metric_output_column_ids {
        el.push(array(types, REPORT_QUERY_FIELDS[2], "int", ids));
    }
    if let Some(filters) = &q.query_filters {
        let mut list = Element::new(types, REPORT_QUERY_FIELDS[3]);
        for f in filters {
            list.push(f.clone());
        }
        el.push(list);
    }
    if let Some(params) = &q.query_parameters {
        let mut list = Element::new(types, REPORT_QUERY_FIELDS[4]);
        for p in params {
            let mut qp = Element::new(types, "QueryParameter")
                .with_child(Element::new(types, "ParameterType").with_text(&p.parameter_type));
            if let Some(v) = &p.parameter_value {
                qp.push(Element::new(types, "ParameterValue").with_text(v));
            }
            list.push(qp);
        }
        el.push(list);
    }
    el
}

fn array(types: &str, name: &str, item: &str, values: &[String]) -> Element {
    let mut list = Element::new(types, name);
    for v in values {
        list.push(Element::new(ARRAYS_NS, item).with_text(v));
    }
    list
}

// Only the query is written; id and status belong to the server.
pub fn encode_report_job(job: &ReportJob, ns: &Namespaces) -> Element {
    Element::new(&ns.service, "reportJob").with_child(encode_report_query(&job.report_query, ns))
}

pub fn decode_report_query(el: &Element) -> Result<ReportQueryDefinition> {
    let present = |name: &str| el.child(name).filter(|c| !c.is_nil());
    let texts = |list: &Element| list.elements().map(Element::text).collect::<Vec<_>>();

    let query_parameters = match present(REPORT_QUERY_FIELDS[4]) {
        Some(list) => {
            let mut params = Vec::new();
            for qp in list.children_named("QueryParameter") {
                let parameter_type = qp
                    .child("ParameterType")
                    .map(Element::text)
                    .with_context(|| "QueryParameter without ParameterType")?;
                let parameter_value = qp
                    .child("ParameterValue")
                    .filter(|v| !v.is_nil())
                    .map(Element::text);
                params.push(QueryParameter {
                    parameter_type,
                    parameter_value,
                });
            }
            Some(params)
        }
        None => None,
    };

    Ok(ReportQueryDefinition {
        delivery_detail_output_column_ids: present(REPORT_QUERY_FIELDS[0]).map(texts),
        field_output_column_names: present(REPORT_QUERY_FIELDS[1]).map(texts),
        metric_output_column_ids: present(REPORT_QUERY_FIELDS[2]).map(texts),
        query_filters: present(REPORT_QUERY_FIELDS[3])
            .map(|list| list.elements().cloned().collect()),
        query_parameters,
    })
}

pub fn decode_saved_reports(result: &Element) -> Result<Vec<SavedReport>> {
    let mut items = Vec::new();
    collect_named(result, "SavedReport", &mut items);
    items
        .into_iter()
        .map(|item| {
            Ok(SavedReport {
                name: item.child("Name").map(Element::text).unwrap_or_default(),
                saved_report_id: required_i64(item, "SavedReportID", "GetSavedReportList")?,
            })
        })
        .collect()
}

pub fn decode_saved_report_query(result: &Element) -> Result<SavedReportQuery> {
    let op = "GetSavedReportQuery";
    let query = result
        .child("ReportQuery")
        .filter(|q| !q.is_nil())
        .ok_or_else(|| missing(op, "ReportQuery"))?;
    Ok(SavedReportQuery {
        name: result.child("Name").map(Element::text).unwrap_or_default(),
        saved_report_id: required_i64(result, "SavedReportID", op)?,
        report_query: decode_report_query(query)?,
    })
}

pub fn decode_report_job(result: &Element, operation: &str) -> Result<ReportJob> {
    let report_query = match result.child("ReportQuery").filter(|q| !q.is_nil()) {
        Some(q) => decode_report_query(q)?,
        None => ReportQueryDefinition::default(),
    };
    Ok(ReportJob {
        report_job_id: Some(required_i64(result, "ReportJobID", operation)?),
        report_query,
        status: optional_text(result, "Status"),
        status_message: optional_text(result, "StatusMessage"),
    })
}

fn optional_text(el: &Element, name: &str) -> Option<String> {
    el.child(name).filter(|c| !c.is_nil()).map(Element::text)
}

fn required_i64(el: &Element, name: &str, operation: &str) -> Result<i64> {
    let raw = el
        .child(name)
        .map(Element::text)
        .ok_or_else(|| missing(operation, name))?;
    raw.parse::<i64>()
        .with_context(|| format!("{operation}: {name} is not an integer: {raw:?}"))
}

fn missing(operation: &str, element: &str) -> ServiceError {
    ServiceError::Missing {
        operation: operation.to_string(),
        element: element.to_string(),
    }
}

fn collect_named<'a>(el: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in el.elements() {
        if child.name == name {
            out.push(child);
        } else {
            collect_named(child, name, out);
        }
    }
}
