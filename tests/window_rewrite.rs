use adbook_report::{
    service::{QueryParameter, ReportQueryDefinition},
    window::{rewrite_parameters, DateWindow},
};
use time::macros::date;

fn param(kind: &str, value: Option<&str>) -> QueryParameter {
    QueryParameter {
        parameter_type: kind.into(),
        parameter_value: value.map(str::to_string),
    }
}

#[test]
fn rewrites_start_and_end_dates() {
    let mut q = ReportQueryDefinition {
        query_parameters: Some(vec![
            param("StartDate", Some("2016-01-01")),
            param("Advertiser", Some("1234")),
            param("EndDate", None),
            param("Scope", None),
        ]),
        ..Default::default()
    };
    let window = DateWindow::rolling(date!(2016 - 08 - 04), 7, 1).unwrap();

    let n = rewrite_parameters(&mut q, &window, "StartDate", "EndDate");

    assert_eq!(n, 2);
    let params = q.query_parameters.unwrap();
    assert_eq!(params[0], param("StartDate", Some("2016-07-28")));
    assert_eq!(params[1], param("Advertiser", Some("1234")));
    assert_eq!(params[2], param("EndDate", Some("2016-08-03")));
    assert_eq!(params[3], param("Scope", None));
}

#[test]
fn no_parameters_is_a_no_op() {
    let window = DateWindow::rolling(date!(2016 - 08 - 04), 7, 1).unwrap();

    let mut absent = ReportQueryDefinition::default();
    assert_eq!(rewrite_parameters(&mut absent, &window, "StartDate", "EndDate"), 0);
    assert_eq!(absent, ReportQueryDefinition::default());

    let mut unrelated = ReportQueryDefinition {
        query_parameters: Some(vec![param("Advertiser", Some("1"))]),
        ..Default::default()
    };
    let before = unrelated.clone();
    assert_eq!(rewrite_parameters(&mut unrelated, &window, "StartDate", "EndDate"), 0);
    assert_eq!(unrelated, before);
}
