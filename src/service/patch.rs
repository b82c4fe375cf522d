use super::types::ReportQueryDefinition;
use crate::config::{self, PatchMode};
use crate::xml::Element;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementInsertion {
    pub name: String,
    pub index: usize,
}

impl ElementInsertion {
    pub fn new(name: &str, index: usize) -> Self {
        let local = name.rsplit_once(':').map_or(name, |(_, local)| local);
        Self {
            name: local.to_string(),
            index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PatchOutcome {
    Inserted { name: String, index: usize },
    AlreadyPresent { name: String },
    Failed { name: String, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaPatch {
    target: Vec<String>,
    namespace: String,
    insertions: Vec<ElementInsertion>,
}

impl SchemaPatch {
    pub fn new(target: &[&str], namespace: &str, insertions: Vec<ElementInsertion>) -> Self {
        Self {
            target: target.iter().map(|s| s.to_string()).collect(),
            namespace: namespace.to_string(),
            insertions,
        }
    }

    pub fn from_config(
        cfg: &config::Patch,
        target: &[&str],
        namespace: &str,
        query: &ReportQueryDefinition,
    ) -> Option<Self> {
        let insertions: Vec<ElementInsertion> = match cfg.mode {
            PatchMode::Off => return None,
            PatchMode::Explicit => cfg
                .elements
                .iter()
                .map(|e| ElementInsertion::new(&e.name, e.index))
                .collect(),
            PatchMode::Auto => query
                .absent_fields()
                .into_iter()
                .map(|(index, name)| ElementInsertion::new(name, index))
                .collect(),
        };
        if insertions.is_empty() {
            return None;
        }
        Some(Self::new(target, namespace, insertions))
    }

    pub fn insertions(&self) -> &[ElementInsertion] {
        &self.insertions
    }

    pub fn apply(&self, envelope: &mut Element) -> Vec<PatchOutcome> {
        let path: Vec<&str> = self.target.iter().map(String::as_str).collect();
        let Some(target) = envelope.find_path_mut(&path) else {
            let reason = format!("target {} not found in request", self.target.join("/"));
            return self
                .insertions
                .iter()
                .map(|ins| {
                    warn!("unable to insert {} into ReportQuery: {reason}", ins.name);
                    PatchOutcome::Failed {
                        name: ins.name.clone(),
                        reason: reason.clone(),
                    }
                })
                .collect();
        };

        let mut outcomes = Vec::with_capacity(self.insertions.len());
        for ins in &self.insertions {
            if target.child(&ins.name).is_some() {
                outcomes.push(PatchOutcome::AlreadyPresent {
                    name: ins.name.clone(),
                });
                continue;
            }
            info!("adding element to ReportQuery: {} at {}", ins.name, ins.index);
            match target.insert_element(ins.index, Element::new(&self.namespace, &ins.name)) {
                Ok(()) => outcomes.push(PatchOutcome::Inserted {
                    name: ins.name.clone(),
                    index: ins.index,
                }),
                Err(err) => {
                    warn!("unable to insert {} into ReportQuery: {err}", ins.name);
                    outcomes.push(PatchOutcome::Failed {
                        name: ins.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        outcomes
    }
}
