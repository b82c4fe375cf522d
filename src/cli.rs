use crate::{
    config::Config,
    credentials::Credentials,
    pipeline::{ReportFetcher, RunOptions, Stage},
    poll::{install_interrupt_handler, ThreadWaiter},
    selection::ReportSelector,
    service::{soap, HttpTransport, SoapService},
    util::ensure_parent,
    window,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::blocking::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_CONFIG: &str = "adbook-report.toml";

#[derive(Parser, Debug)]
#[command(name = "adbook-report")]
#[command(about = "Run an AdBook saved report over SOAP and download the result")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./adbook-report.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the service endpoint URL.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Override the credentials JSON file.
    #[arg(long)]
    pub credentials: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct Selection {
    /// Saved report id.
    #[arg(long, conflicts_with_all = ["report_index", "report_name"])]
    pub report_id: Option<i64>,
    /// Position in the saved report list (0 = first).
    #[arg(long, conflicts_with = "report_name")]
    pub report_index: Option<usize>,
    /// Exact saved report name.
    #[arg(long)]
    pub report_name: Option<String>,
}

impl Selection {
    fn selector(&self, cfg: &Config) -> ReportSelector {
        if let Some(id) = self.report_id {
            ReportSelector::Id(id)
        } else if let Some(i) = self.report_index {
            ReportSelector::Index(i)
        } else if let Some(name) = &self.report_name {
            ReportSelector::Name(name.clone())
        } else {
            ReportSelector::from_config(cfg)
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the WSDL and check it declares every operation used.
    Doctor {},
    /// List saved reports.
    List {},
    /// Show a saved report query with the date window applied, without running it.
    Show {
        #[command(flatten)]
        select: Selection,
        /// Reference day for the date window (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Run a saved report and download the result.
    Run {
        #[command(flatten)]
        select: Selection,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Download format, e.g. CSV.
        #[arg(long)]
        format: Option<String>,
        /// Seconds between status polls.
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Give up after this many seconds of polling (0 = never).
        #[arg(long)]
        poll_timeout: Option<u64>,
        /// Reference day for the date window (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<String>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let mut cfg = match &cfg_path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        cfg.service.endpoint = endpoint.clone();
    }
    if let Some(creds) = &args.credentials {
        cfg.auth.credentials_file = creds.display().to_string();
    }

    let _guard = init_logging(&args, &cfg)?;
    match &cfg_path {
        Some(p) => debug!("config {}", p.display()),
        None => debug!("no config file; using defaults"),
    }

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::List {} => list(&cfg),
        Command::Show { select, as_of } => show(&cfg, select, as_of.as_deref()),
        Command::Run {
            select,
            output,
            format,
            poll_interval,
            poll_timeout,
            as_of,
        } => {
            if let Some(secs) = poll_interval {
                cfg.poll.interval_seconds = *secs;
            }
            if let Some(secs) = poll_timeout {
                cfg.poll.timeout_seconds = *secs;
            }
            if let Some(format) = format {
                cfg.download.format = format.clone();
            }
            if let Some(output) = output {
                cfg.output.path = output.display().to_string();
            }
            run(&cfg, select, as_of.as_deref())
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = user {
        if !p.exists() {
            bail!("config file not found: {}", p.display());
        }
        return Ok(Some(p.to_path_buf()));
    }
    let default = PathBuf::from(DEFAULT_CONFIG);
    Ok(default.exists().then_some(default))
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if cfg.logging.write_to_file && !cfg.logging.file_path.is_empty() {
        let path = Path::new(&cfg.logging.file_path);
        ensure_parent(path)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    if cfg.debug.dump_effective_config {
        debug!("effective config:\n{}", toml::to_string(cfg).unwrap_or_default());
    }

    Ok(guard)
}

fn open_session(cfg: &Config) -> Result<SoapService<HttpTransport>> {
    let open = || -> Result<SoapService<HttpTransport>> {
        let creds = Credentials::resolve(
            Path::new(&cfg.auth.credentials_file),
            cfg.auth.allow_env_override,
        )?;
        let transport = HttpTransport::new(cfg)?;
        SoapService::connect(cfg, creds, transport)
    };
    open().with_context(|| Stage::Bootstrap.failed())
}

fn download_client(cfg: &Config) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.download.timeout_seconds))
        .user_agent(cfg.service.user_agent.clone())
        .build()
        .with_context(|| "building download client")
}

fn resolve_today(as_of: Option<&str>) -> Result<time::Date> {
    match as_of {
        Some(raw) => window::parse_date(raw),
        None => Ok(window::today()),
    }
}

fn doctor(cfg: &Config) -> Result<()> {
    let transport = HttpTransport::new(cfg)?;
    let diag = soap::fetch_wsdl(&transport, &cfg.wsdl_url())?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        bail!("WSDL is missing operations: {}", diag.missing.join(", "));
    }
    Ok(())
}

fn list(cfg: &Config) -> Result<()> {
    let session = open_session(cfg)?;
    let mut fetcher = ReportFetcher::new(cfg, session, download_client(cfg)?);
    let reports = fetcher.list().with_context(|| Stage::Discovery.failed());
    fetcher.into_service().close();
    println!("{}", serde_json::to_string_pretty(&reports?)?);
    Ok(())
}

fn show(cfg: &Config, select: &Selection, as_of: Option<&str>) -> Result<()> {
    let today = resolve_today(as_of)?;
    let session = open_session(cfg)?;
    let mut fetcher = ReportFetcher::new(cfg, session, download_client(cfg)?);
    let prepared = fetcher
        .prepare(&select.selector(cfg), today)
        .with_context(|| Stage::Discovery.failed());
    fetcher.into_service().close();
    println!("{}", serde_json::to_string_pretty(&prepared?)?);
    Ok(())
}

fn run(cfg: &Config, select: &Selection, as_of: Option<&str>) -> Result<()> {
    let opts = RunOptions {
        selector: select.selector(cfg),
        today: resolve_today(as_of)?,
        output: PathBuf::from(&cfg.output.path),
        format: cfg.download.format.clone(),
    };
    let interrupt = install_interrupt_handler()?;
    let session = open_session(cfg)?;
    let mut fetcher = ReportFetcher::new(cfg, session, download_client(cfg)?);

    let mut waiter = ThreadWaiter::new(interrupt);
    let result = fetcher.run(&opts, &mut waiter);
    fetcher.into_service().close();
    let summary = result?;

    info!("report saved to {}", summary.output.display());
    if cfg.output.print_summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
