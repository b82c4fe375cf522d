use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: Service,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub report: Report,
    #[serde(default)]
    pub window: Window,
    #[serde(default)]
    pub patch: Patch,
    #[serde(default)]
    pub poll: Poll,
    #[serde(default)]
    pub download: Download,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn wsdl_url(&self) -> String {
        if self.service.wsdl_url.is_empty() {
            format!("{}?singleWsdl", self.service.endpoint)
        } else {
            self.service.wsdl_url.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub endpoint: String,
    pub wsdl_url: String,
    pub check_wsdl: bool,
    pub namespace: String,
    pub types_namespace: String,
    pub contract: String,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}
impl Default for Service {
    fn default() -> Self {
        Self {
            endpoint: "https://adserver.fattail.com/abn/ws/AdBookConnect.svc".into(),
            wsdl_url: "".into(),
            check_wsdl: true,
            namespace: "http://www.FatTail.com/api".into(),
            types_namespace: "http://schemas.datacontract.org/2004/07/FatTail.AdBook.Connect"
                .into(),
            contract: "IAdBookConnect".into(),
            request_timeout_seconds: 120,
            user_agent: concat!("adbook-report/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Auth {
    pub credentials_file: String,
    pub allow_env_override: bool,
}
impl Default for Auth {
    fn default() -> Self {
        Self {
            credentials_file: "auth.json".into(),
            allow_env_override: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Report {
    pub index: usize,
    pub saved_report_id: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Window {
    pub enabled: bool,
    pub start_offset_days: i64,
    pub end_offset_days: i64,
    pub start_parameter: String,
    pub end_parameter: String,
}
impl Default for Window {
    fn default() -> Self {
        Self {
            enabled: true,
            start_offset_days: 7,
            end_offset_days: 1,
            start_parameter: "StartDate".into(),
            end_parameter: "EndDate".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    Explicit,
    Auto,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    pub mode: PatchMode,
    pub elements: Vec<PatchElement>,
}
impl Default for Patch {
    fn default() -> Self {
        Self {
            mode: PatchMode::Explicit,
            elements: vec![PatchElement {
                name: "DeliveryDetailOutputColumnIDList".into(),
                index: 0,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchElement {
    pub name: String,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Poll {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub max_polls: u32,
    pub done_status: String,
    pub failure_statuses: Vec<String>,
}
impl Default for Poll {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            timeout_seconds: 0,
            max_polls: 0,
            done_status: "Done".into(),
            failure_statuses: vec![
                "Failed".into(),
                "Error".into(),
                "Cancelled".into(),
                "Canceled".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Download {
    pub format: String,
    pub chunk_size: usize,
    pub timeout_seconds: u64,
}
impl Default for Download {
    fn default() -> Self {
        Self {
            format: "CSV".into(),
            chunk_size: 1024,
            timeout_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub path: String,
    pub hash_output: bool,
    pub print_summary: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            path: "adbook.csv".into(),
            hash_output: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "adbook-report.log".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub log_envelopes: bool,
    pub dump_effective_config: bool,
}
