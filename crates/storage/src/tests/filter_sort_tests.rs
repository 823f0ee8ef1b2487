use super::*;

use shared::domain::{Car, Customer};

fn rendered<E: Entity>(criteria: &QueryCriteria) -> String {
    let shape = shape::<E>(criteria).expect("valid criteria");
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT id FROM {}", E::TABLE));
    shape.apply(&mut builder);
    builder.sql().to_string()
}

#[test]
fn empty_criteria_orders_by_id_only() {
    assert_eq!(
        rendered::<Customer>(&QueryCriteria::all()),
        "SELECT id FROM customers ORDER BY id ASC"
    );
}

#[test]
fn empty_filter_text_matches_everything() {
    assert_eq!(
        rendered::<Customer>(&QueryCriteria::filtered("")),
        "SELECT id FROM customers ORDER BY id ASC"
    );
}

#[test]
fn text_filter_searches_every_designated_column() {
    assert_eq!(
        rendered::<Car>(&QueryCriteria::filtered("Civic")),
        "SELECT id FROM cars WHERE (make_folded LIKE ? ESCAPE '\\' OR model_folded LIKE ? ESCAPE '\\' OR version_folded LIKE ? ESCAPE '\\') ORDER BY id ASC"
    );
}

#[test]
fn text_columns_sort_case_insensitively_with_id_tiebreak() {
    assert_eq!(
        rendered::<Customer>(&QueryCriteria::sorted("customer_name", true)),
        "SELECT id FROM customers ORDER BY LOWER(customer_name) DESC, id ASC"
    );
}

#[test]
fn numeric_columns_sort_naturally() {
    let shape = shape::<Car>(&QueryCriteria::sorted("price", false)).expect("shape");
    assert_eq!(shape.order_by(), "price ASC, id ASC");
}

#[test]
fn sorting_by_id_has_no_redundant_tiebreak() {
    let shape = shape::<Car>(&QueryCriteria::sorted("id", true)).expect("shape");
    assert_eq!(shape.order_by(), "id DESC");
}

#[test]
fn unknown_sort_field_is_rejected() {
    let err = shape::<Customer>(&QueryCriteria::sorted("password", false)).expect_err("unknown");
    assert_eq!(err, CriteriaError::UnknownSortField("password".into()));
    assert_eq!(err.field(), "sort_field");
}

#[test]
fn range_filters_require_numeric_columns() {
    let criteria = QueryCriteria {
        column_filters: vec![ColumnFilter::AtLeast {
            column: "make".into(),
            value: 3,
        }],
        ..QueryCriteria::default()
    };
    assert_eq!(
        shape::<Car>(&criteria).expect_err("text column"),
        CriteriaError::NotNumeric("make".into())
    );
}

#[test]
fn column_filters_and_page_window_compose() {
    let criteria = QueryCriteria {
        filter: Some("a".into()),
        sort_field: Some("year".into()),
        descending: false,
        column_filters: vec![
            ColumnFilter::Equals {
                column: "make".into(),
                value: "Honda".into(),
            },
            ColumnFilter::AtLeast {
                column: "year".into(),
                value: 2010,
            },
            ColumnFilter::AtMost {
                column: "price".into(),
                value: 30_000,
            },
        ],
        page: Some(PageRequest { number: 2, size: 10 }),
    };
    assert_eq!(
        rendered::<Car>(&criteria),
        "SELECT id FROM cars WHERE (make_folded LIKE ? ESCAPE '\\' OR model_folded LIKE ? ESCAPE '\\' OR version_folded LIKE ? ESCAPE '\\') AND make = ? AND year >= ? AND price <= ? ORDER BY year ASC, id ASC LIMIT ? OFFSET ?"
    );
}

#[test]
fn unknown_filter_column_is_rejected() {
    let criteria = QueryCriteria {
        column_filters: vec![ColumnFilter::Equals {
            column: "colour".into(),
            value: "red".into(),
        }],
        ..QueryCriteria::default()
    };
    assert_eq!(
        shape::<Car>(&criteria).expect_err("unknown column"),
        CriteriaError::UnknownFilterColumn("colour".into())
    );
}

#[test]
fn like_wildcards_are_escaped() {
    assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
}

#[test]
fn shaping_is_deterministic() {
    let criteria = QueryCriteria {
        filter: Some("Ana".into()),
        sort_field: Some("salary".into()),
        descending: true,
        ..QueryCriteria::default()
    };
    assert_eq!(
        shape::<Customer>(&criteria).expect("first"),
        shape::<Customer>(&criteria).expect("second")
    );
}
