use adbook_report::{
    credentials::Credentials,
    service::{
        codec,
        envelope::{self, Namespaces, RUN_REPORT_QUERY_PATH},
        ElementInsertion, PatchOutcome, QueryParameter, ReportJob, ReportQueryDefinition,
        SchemaPatch,
    },
    xml::Element,
};

const TYPES_NS: &str = "http://schemas.datacontract.org/2004/07/FatTail.AdBook.Connect";

fn ns() -> Namespaces {
    Namespaces {
        service: "http://www.FatTail.com/api".into(),
        types: TYPES_NS.into(),
    }
}

fn request(query: ReportQueryDefinition) -> Element {
    let creds = Credentials {
        username: "user".into(),
        password: "secret".into(),
    };
    let op = Element::new(&ns().service, "RunReportJob")
        .with_child(codec::encode_report_job(&ReportJob::new(query), &ns()));
    envelope::build(&creds, op)
}

fn query_without_delivery_details() -> ReportQueryDefinition {
    ReportQueryDefinition {
        field_output_column_names: Some(vec!["Campaign".into()]),
        metric_output_column_ids: Some(vec!["3".into()]),
        query_filters: Some(vec![]),
        query_parameters: Some(vec![QueryParameter {
            parameter_type: "StartDate".into(),
            parameter_value: Some("2016-07-28".into()),
        }]),
        ..Default::default()
    }
}

fn delivery_patch() -> SchemaPatch {
    SchemaPatch::new(
        &RUN_REPORT_QUERY_PATH,
        TYPES_NS,
        vec![ElementInsertion::new("ns1:DeliveryDetailOutputColumnIDList", 0)],
    )
}

#[test]
fn inserts_empty_element_first() {
    let mut env = request(query_without_delivery_details());
    let outcomes = delivery_patch().apply(&mut env);
    assert_eq!(
        outcomes,
        vec![PatchOutcome::Inserted {
            name: "DeliveryDetailOutputColumnIDList".into(),
            index: 0
        }]
    );

    let out = envelope::render(&env, &ns()).unwrap();
    assert!(out.contains(
        "<ns1:ReportQuery><ns1:DeliveryDetailOutputColumnIDList/><ns1:FieldOutputColumnNameList>"
    ));
}

#[test]
fn leaves_existing_element_alone() {
    let mut query = query_without_delivery_details();
    query.delivery_detail_output_column_ids = Some(vec!["11".into()]);
    let mut env = request(query);

    let outcomes = delivery_patch().apply(&mut env);
    assert!(matches!(outcomes[0], PatchOutcome::AlreadyPresent { .. }));

    let out = envelope::render(&env, &ns()).unwrap();
    assert_eq!(out.matches("<ns1:DeliveryDetailOutputColumnIDList").count(), 1);
}

#[test]
fn insertions_apply_in_order() {
    let query = ReportQueryDefinition {
        field_output_column_names: Some(vec![]),
        metric_output_column_ids: Some(vec![]),
        query_parameters: Some(vec![]),
        ..Default::default()
    };
    let mut env = request(query);
    let patch = SchemaPatch::new(
        &RUN_REPORT_QUERY_PATH,
        TYPES_NS,
        vec![
            ElementInsertion::new("DeliveryDetailOutputColumnIDList", 0),
            ElementInsertion::new("QueryFilterList", 3),
        ],
    );
    patch.apply(&mut env);

    let names: Vec<&str> = env
        .find_path(&RUN_REPORT_QUERY_PATH)
        .unwrap()
        .elements()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "DeliveryDetailOutputColumnIDList",
            "FieldOutputColumnNameList",
            "MetricOutputColumnIDList",
            "QueryFilterList",
            "QueryParameterList",
        ]
    );
}

#[test]
fn failures_are_reported_not_raised() {
    let mut env = request(query_without_delivery_details());
    let out_of_range = SchemaPatch::new(
        &RUN_REPORT_QUERY_PATH,
        TYPES_NS,
        vec![ElementInsertion::new("DeliveryDetailOutputColumnIDList", 9)],
    );
    let outcomes = out_of_range.apply(&mut env);
    assert!(matches!(outcomes[0], PatchOutcome::Failed { .. }));

    let mut other = Element::new("urn:x", "Envelope");
    let outcomes = delivery_patch().apply(&mut other);
    assert!(matches!(outcomes[0], PatchOutcome::Failed { .. }));
    assert_eq!(other, Element::new("urn:x", "Envelope"));
}
