use crate::xml;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;

pub const REQUIRED_OPERATIONS: [&str; 5] = [
    "GetSavedReportList",
    "GetSavedReportQuery",
    "RunReportJob",
    "GetReportJob",
    "GetReportDownloadURL",
];

#[derive(Debug, Clone, Serialize)]
pub struct WsdlDiag {
    pub url: String,
    pub target_namespace: Option<String>,
    pub operations: Vec<String>,
    pub missing: Vec<String>,
    pub ok: bool,
}

pub fn inspect(url: &str, raw: &str) -> Result<WsdlDiag> {
    let root = xml::parse(raw).with_context(|| format!("parsing WSDL: {url}"))?;
    if root.name != "definitions" {
        bail!("not a WSDL document (root element <{}>): {url}", root.name);
    }

    let mut operations = BTreeSet::new();
    for port_type in root.children_named("portType") {
        for op in port_type.children_named("operation") {
            if let Some(name) = op.attr("name") {
                operations.insert(name.to_string());
            }
        }
    }

    let missing: Vec<String> = REQUIRED_OPERATIONS
        .iter()
        .filter(|op| !operations.contains(**op))
        .map(|op| op.to_string())
        .collect();

    Ok(WsdlDiag {
        url: url.to_string(),
        target_namespace: root.attr("targetNamespace").map(str::to_string),
        ok: missing.is_empty(),
        operations: operations.into_iter().collect(),
        missing,
    })
}
