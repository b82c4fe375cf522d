use adbook_report::{
    config::Config,
    credentials::Credentials,
    pipeline::{ReportFetcher, RunOptions},
    poll::Waiter,
    selection::ReportSelector,
    service::{
        PatchOutcome, ReportService, ServiceError, SoapService, Transport, TransportResponse,
    },
    window::parse_date,
};
use anyhow::Result;
use httpmock::prelude::*;
use reqwest::blocking::Client;
use std::cell::{Cell, RefCell};
use std::time::Duration;

const ENDPOINT: &str = "http://adbook.test/abn/ws/AdBookConnect.svc";

const WSDL: &str = r#"<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" targetNamespace="http://www.FatTail.com/api">
  <wsdl:portType name="IAdBookConnect">
    <wsdl:operation name="GetSavedReportList"/>
    <wsdl:operation name="GetSavedReportQuery"/>
    <wsdl:operation name="RunReportJob"/>
    <wsdl:operation name="GetReportJob"/>
    <wsdl:operation name="GetReportDownloadURL"/>
  </wsdl:portType>
</wsdl:definitions>"#;

const SAVED_QUERY: &str = r#"<a:Name>Weekly</a:Name>
<a:ReportQuery>
  <a:DeliveryDetailOutputColumnIDList i:nil="true"/>
  <a:FieldOutputColumnNameList><b:string>Advertiser</b:string></a:FieldOutputColumnNameList>
  <a:MetricOutputColumnIDList><b:int>3</b:int></a:MetricOutputColumnIDList>
  <a:QueryFilterList/>
  <a:QueryParameterList>
    <a:QueryParameter><a:ParameterType>StartDate</a:ParameterType><a:ParameterValue>2016-01-01</a:ParameterValue></a:QueryParameter>
    <a:QueryParameter><a:ParameterType>EndDate</a:ParameterType><a:ParameterValue>2016-01-31</a:ParameterValue></a:QueryParameter>
  </a:QueryParameterList>
</a:ReportQuery>
<a:SavedReportID>42</a:SavedReportID>"#;

fn response(op: &str, inner: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><{op}Response xmlns="http://www.FatTail.com/api"><{op}Result xmlns:a="http://schemas.datacontract.org/2004/07/FatTail.AdBook.Connect" xmlns:b="http://schemas.microsoft.com/2003/10/Serialization/Arrays" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">{inner}</{op}Result></{op}Response></s:Body></s:Envelope>"#
    )
}

fn fault(message: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>{message}</faultstring></s:Fault></s:Body></s:Envelope>"#
    )
}

/// Plays the service side of a run; records every SOAP request.
struct ScriptedTransport {
    download_url: String,
    reject_submit: bool,
    job_polls: Cell<u32>,
    requests: RefCell<Vec<(String, String)>>,
}

impl ScriptedTransport {
    fn new(download_url: String) -> Self {
        Self {
            download_url,
            reject_submit: false,
            job_polls: Cell::new(0),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn body_of(&self, op: &str) -> Option<String> {
        self.requests
            .borrow()
            .iter()
            .find(|(action, _)| action.ends_with(&format!("/{op}")))
            .map(|(_, body)| body.clone())
    }
}

impl Transport for ScriptedTransport {
    fn post(&self, url: &str, soap_action: &str, body: String) -> Result<TransportResponse> {
        assert_eq!(url, ENDPOINT);
        self.requests
            .borrow_mut()
            .push((soap_action.to_string(), body));
        let op = soap_action.rsplit('/').next().unwrap_or_default();
        let ok = |body: String| TransportResponse { status: 200, body };
        Ok(match op {
            "GetSavedReportList" => ok(response(
                op,
                "<a:SavedReport><a:Name>Weekly</a:Name><a:SavedReportID>42</a:SavedReportID></a:SavedReport>\
                 <a:SavedReport><a:Name>Monthly</a:Name><a:SavedReportID>43</a:SavedReportID></a:SavedReport>",
            )),
            "GetSavedReportQuery" => ok(response(op, SAVED_QUERY)),
            "RunReportJob" if self.reject_submit => TransportResponse {
                status: 500,
                body: fault("ReportQuery is not valid"),
            },
            "RunReportJob" => ok(response(
                op,
                "<a:ReportJobID>7</a:ReportJobID><a:Status>Queued</a:Status>",
            )),
            "GetReportJob" => {
                self.job_polls.set(self.job_polls.get() + 1);
                let status = if self.job_polls.get() < 2 { "Running" } else { "Done" };
                ok(response(
                    op,
                    &format!("<a:ReportJobID>7</a:ReportJobID><a:Status>{status}</a:Status>"),
                ))
            }
            "GetReportDownloadURL" => ok(response(op, &self.download_url)),
            other => panic!("unexpected operation {other}"),
        })
    }

    fn get(&self, url: &str) -> Result<TransportResponse> {
        assert_eq!(url, format!("{ENDPOINT}?singleWsdl"));
        Ok(TransportResponse {
            status: 200,
            body: WSDL.to_string(),
        })
    }
}

#[derive(Default)]
struct CountingWaiter {
    waits: u32,
}

impl Waiter for CountingWaiter {
    fn start(&mut self) {}

    fn wait(&mut self, _: Duration) -> bool {
        self.waits += 1;
        true
    }

    fn elapsed(&self) -> Duration {
        Duration::from_secs(10 * u64::from(self.waits))
    }
}

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.service.endpoint = ENDPOINT.to_string();
    cfg
}

fn credentials() -> Credentials {
    Credentials {
        username: "ops@example.com".into(),
        password: "hunter2".into(),
    }
}

#[test]
fn runs_first_saved_report_and_downloads_it() {
    let server = MockServer::start();
    let payload = vec![b'x'; 2048];
    let file = server.mock(|when, then| {
        when.method(GET).path("/reports/7.csv");
        then.status(200).body(payload.clone());
    });

    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let transport = ScriptedTransport::new(server.url("/reports/7.csv"));
    let service = SoapService::connect(&cfg, credentials(), transport).unwrap();
    let mut fetcher = ReportFetcher::new(&cfg, service, Client::new());
    let opts = RunOptions {
        selector: ReportSelector::default(),
        today: parse_date("2016-08-04").unwrap(),
        output: dir.path().join("adbook.csv"),
        format: "CSV".into(),
    };
    let mut waiter = CountingWaiter::default();

    let summary = fetcher.run(&opts, &mut waiter).unwrap();

    file.assert();
    assert_eq!(summary.saved_report.saved_report_id, 42);
    assert_eq!(summary.report_job_id, 7);
    assert_eq!(summary.window_start.as_deref(), Some("2016-07-28"));
    assert_eq!(summary.window_end.as_deref(), Some("2016-08-03"));
    assert_eq!(summary.parameters_rewritten, 2);
    assert_eq!(summary.polls, 2);
    assert_eq!(summary.bytes, 2048);
    assert!(summary.sha256.is_some());
    assert_eq!(waiter.waits, 1);
    assert_eq!(std::fs::read(&opts.output).unwrap(), payload);

    let service = fetcher.into_service();
    assert_eq!(
        service.patch_outcomes(),
        &[PatchOutcome::Inserted {
            name: "DeliveryDetailOutputColumnIDList".into(),
            index: 0
        }]
    );

    let transport = service.transport();
    let query_req = transport.body_of("GetSavedReportQuery").unwrap();
    assert!(query_req.contains("<api:savedReportID>42</api:savedReportID>"));
    assert!(query_req.contains("#PasswordText"));

    let submit = transport.body_of("RunReportJob").unwrap();
    assert!(submit.contains(
        "<ns1:ReportQuery><ns1:DeliveryDetailOutputColumnIDList/><ns1:FieldOutputColumnNameList>"
    ));
    assert!(submit.contains("<ns1:ParameterValue>2016-07-28</ns1:ParameterValue>"));
    assert!(submit.contains("<ns1:ParameterValue>2016-08-03</ns1:ParameterValue>"));
    assert!(!submit.contains("Status"));
    assert!(!submit.contains("ReportJobID"));

    let download_req = transport.body_of("GetReportDownloadURL").unwrap();
    assert!(download_req.contains("<api:reportFormat>CSV</api:reportFormat>"));

    service.close();
}

#[test]
fn submission_fault_is_labelled() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config();
    let mut transport = ScriptedTransport::new("unused".into());
    transport.reject_submit = true;
    let service = SoapService::connect(&cfg, credentials(), transport).unwrap();
    let mut fetcher = ReportFetcher::new(&cfg, service, Client::new());
    let opts = RunOptions {
        selector: ReportSelector::Id(42),
        today: parse_date("2016-08-04").unwrap(),
        output: dir.path().join("adbook.csv"),
        format: "CSV".into(),
    };

    let err = fetcher.run(&opts, &mut CountingWaiter::default()).unwrap_err();

    let text = format!("{err:#}");
    assert!(text.starts_with("submission failed"), "{text}");
    assert!(text.contains("ReportQuery is not valid"), "{text}");
    assert!(fetcher.service().transport().body_of("GetReportJob").is_none());
    assert!(!opts.output.exists());
}

#[test]
fn connect_rejects_incomplete_wsdl() {
    struct NoWsdl;
    impl Transport for NoWsdl {
        fn post(&self, _: &str, _: &str, _: String) -> Result<TransportResponse> {
            unreachable!()
        }
        fn get(&self, _: &str) -> Result<TransportResponse> {
            Ok(TransportResponse {
                status: 200,
                body: r#"<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"><portType name="X"/></definitions>"#
                    .to_string(),
            })
        }
    }

    let err = SoapService::connect(&config(), credentials(), NoWsdl).err().unwrap();
    assert!(err.to_string().contains("RunReportJob"));
}

#[test]
fn non_xml_error_page_becomes_http_error() {
    struct Unavailable;
    impl Transport for Unavailable {
        fn post(&self, _: &str, _: &str, _: String) -> Result<TransportResponse> {
            Ok(TransportResponse {
                status: 503,
                body: "<html><body>Service Unavailable<br></body></html>".to_string(),
            })
        }
        fn get(&self, _: &str) -> Result<TransportResponse> {
            unreachable!()
        }
    }

    let mut cfg = config();
    cfg.service.check_wsdl = false;
    let mut service = SoapService::connect(&cfg, credentials(), Unavailable).unwrap();

    let err = service.list_saved_reports().unwrap_err();

    match err.downcast_ref::<ServiceError>() {
        Some(ServiceError::Http {
            operation, status, body,
        }) => {
            assert_eq!(operation, "GetSavedReportList");
            assert_eq!(*status, 503);
            assert!(body.contains("Service Unavailable"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
