use super::ServiceError;
use crate::config;
use crate::credentials::Credentials;
use crate::xml::{self, Element, XSI_NS};
use anyhow::Result;

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const PASSWORD_TEXT: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
pub const ARRAYS_NS: &str = "http://schemas.microsoft.com/2003/10/Serialization/Arrays";

pub const RUN_REPORT_QUERY_PATH: [&str; 4] = ["Body", "RunReportJob", "reportJob", "ReportQuery"];

#[derive(Debug, Clone)]
pub struct Namespaces {
    pub service: String,
    pub types: String,
}

impl Namespaces {
    pub fn from_config(svc: &config::Service) -> Self {
        Self {
            service: svc.namespace.clone(),
            types: svc.types_namespace.clone(),
        }
    }
}

// PasswordText only; no nonce or created stamp.
pub fn security_header(creds: &Credentials) -> Element {
    let token = Element::new(WSSE_NS, "UsernameToken")
        .with_child(Element::new(WSSE_NS, "Username").with_text(&creds.username))
        .with_child(
            Element::new(WSSE_NS, "Password")
                .with_attr(None, "Type", PASSWORD_TEXT)
                .with_text(&creds.password),
        );
    Element::new(WSSE_NS, "Security")
        .with_attr(Some(SOAP_ENV_NS), "mustUnderstand", "1")
        .with_child(token)
}

pub fn build(creds: &Credentials, operation: Element) -> Element {
    Element::new(SOAP_ENV_NS, "Envelope")
        .with_child(Element::new(SOAP_ENV_NS, "Header").with_child(security_header(creds)))
        .with_child(Element::new(SOAP_ENV_NS, "Body").with_child(operation))
}

pub fn render(envelope: &Element, ns: &Namespaces) -> Result<String> {
    xml::to_string(
        envelope,
        &[
            ("soapenv", SOAP_ENV_NS),
            ("wsse", WSSE_NS),
            ("api", ns.service.as_str()),
            ("ns1", ns.types.as_str()),
            ("arr", ARRAYS_NS),
            ("i", XSI_NS),
        ],
    )
}

pub fn operation_result<'a>(
    envelope: &'a Element,
    operation: &str,
) -> Result<&'a Element, ServiceError> {
    let missing = |element: String| ServiceError::Missing {
        operation: operation.to_string(),
        element,
    };
    let body = envelope
        .child("Body")
        .ok_or_else(|| missing("Body".to_string()))?;
    if let Some(fault) = fault_of(body, operation) {
        return Err(fault);
    }
    let response_name = format!("{operation}Response");
    let result_name = format!("{operation}Result");
    body.child(&response_name)
        .ok_or_else(|| missing(response_name.clone()))?
        .child(&result_name)
        .ok_or_else(|| missing(result_name.clone()))
}

pub fn fault_of(body: &Element, operation: &str) -> Option<ServiceError> {
    let fault = body.child("Fault")?;
    let text = |name: &str| fault.child(name).map(Element::text).unwrap_or_default();
    Some(ServiceError::Fault {
        operation: operation.to_string(),
        code: text("faultcode"),
        message: text("faultstring"),
    })
}
