use super::builder::{build_expression_predicate, build_filter_predicate, parse_filter_predicate};
use super::parser::{coerce_filter_value, parse_filter};
use super::types::{FilterOperand, FilterOperator, FilterValue};
use crate::query::Predicate;
use serde_json::json;

#[test]
fn test_simple_equality() {
    let exprs = parse_filter("publication_year:2020");
    assert_eq!(exprs.len(), 1);
    assert_eq!(exprs[0].field, "publication_year");
    assert_eq!(exprs[0].operator, FilterOperator::Eq);
    assert_eq!(exprs[0].value, FilterOperand::One(FilterValue::Int(2020)));
}

#[test]
fn test_comparison_operators() {
    let exprs = parse_filter("publication_year:>2018,cited_by_count:>=100");
    assert_eq!(exprs.len(), 2);
    assert_eq!(exprs[0].field, "publication_year");
    assert_eq!(exprs[0].operator, FilterOperator::Gt);
    assert_eq!(exprs[0].value, FilterOperand::One(FilterValue::Int(2018)));
    assert_eq!(exprs[1].field, "cited_by_count");
    assert_eq!(exprs[1].operator, FilterOperator::Gte);
    assert_eq!(exprs[1].value, FilterOperand::One(FilterValue::Int(100)));
}

#[test]
fn test_lt_and_lte() {
    let exprs = parse_filter("cited_by_count:<10,works_count:<=5");
    assert_eq!(exprs[0].operator, FilterOperator::Lt);
    assert_eq!(exprs[1].operator, FilterOperator::Lte);
}

#[test]
fn test_not_equal() {
    let exprs = parse_filter("type:!=book");
    assert_eq!(exprs.len(), 1);
    assert_eq!(exprs[0].field, "type");
    assert_eq!(exprs[0].operator, FilterOperator::Ne);
    assert_eq!(
        exprs[0].value,
        FilterOperand::One(FilterValue::Str("book".into()))
    );
}

#[test]
fn test_search_suffix() {
    let exprs = parse_filter("display_name.search:neural+networks");
    assert_eq!(exprs.len(), 1);
    assert_eq!(exprs[0].field, "display_name");
    assert_eq!(exprs[0].operator, FilterOperator::Search);
    assert_eq!(
        exprs[0].value,
        FilterOperand::One(FilterValue::Str("neural networks".into()))
    );
}

#[test]
fn test_equals_suffix() {
    let exprs = parse_filter("display_name.equals:Nature");
    assert_eq!(exprs[0].operator, FilterOperator::Exact);
    assert_eq!(exprs[0].field, "display_name");
}

#[test]
fn test_percent_decoding() {
    let exprs = parse_filter("title.search:deep%20learning");
    assert_eq!(
        exprs[0].value,
        FilterOperand::One(FilterValue::Str("deep learning".into()))
    );
}

#[test]
fn test_or_list_parsing() {
    let exprs = parse_filter("publication_year:2020|2021|2022");
    assert_eq!(
        exprs[0].value,
        FilterOperand::Many(vec![
            FilterValue::Int(2020),
            FilterValue::Int(2021),
            FilterValue::Int(2022),
        ])
    );
}

#[test]
fn test_boolean_truthy_variants() {
    for raw in ["true", "1", "yes", "t", "TRUE", "Yes", "T"] {
        assert_eq!(
            coerce_filter_value("has_doi", raw),
            FilterValue::Bool(true),
            "expected {} to coerce to true",
            raw
        );
    }
    assert_eq!(coerce_filter_value("has_doi", "false"), FilterValue::Bool(false));
    assert_eq!(coerce_filter_value("has_doi", "banana"), FilterValue::Bool(false));
}

#[test]
fn test_boolean_suffix_path() {
    assert_eq!(
        coerce_filter_value("open_access.is_oa", "true"),
        FilterValue::Bool(true)
    );
}

#[test]
fn test_null_coercion_overrides_everything() {
    assert_eq!(coerce_filter_value("publication_year", "null"), FilterValue::Null);
    assert_eq!(coerce_filter_value("doi", "None"), FilterValue::Null);
    // Explicit null wins even on a boolean-typed field.
    assert_eq!(coerce_filter_value("has_doi", "null"), FilterValue::Null);
}

#[test]
fn test_integer_fallback_keeps_string() {
    assert_eq!(
        coerce_filter_value("publication_year", "twenty20"),
        FilterValue::Str("twenty20".into())
    );
}

#[test]
fn test_boolean_wins_over_integer_shape() {
    // is_oa is boolean-typed; a "1" is truth, not the number one.
    assert_eq!(coerce_filter_value("is_oa", "1"), FilterValue::Bool(true));
}

#[test]
fn test_id_extracted_from_uri() {
    assert_eq!(
        coerce_filter_value("institutions.id", "https://example.org/I12345"),
        FilterValue::Str("I12345".into())
    );
    assert_eq!(
        coerce_filter_value("id", "https://example.org/W7"),
        FilterValue::Str("W7".into())
    );
    // No slash: value is untouched.
    assert_eq!(
        coerce_filter_value("institutions.id", "I12345"),
        FilterValue::Str("I12345".into())
    );
}

#[test]
fn test_unparseable_expressions_dropped() {
    assert!(parse_filter("garbage").is_empty());
    assert!(parse_filter(":missing-field").is_empty());
    assert!(parse_filter("").is_empty());
    let exprs = parse_filter("garbage,publication_year:2020");
    assert_eq!(exprs.len(), 1);
}

#[test]
fn test_parsing_is_idempotent() {
    let input = "publication_year:2020|2021,cited_by_count:>100,display_name.search:nets";
    assert_eq!(parse_filter(input), parse_filter(input));
    assert_eq!(
        parse_filter_predicate(Some(input)).map(|p| p.to_query_doc()),
        parse_filter_predicate(Some(input)).map(|p| p.to_query_doc())
    );
}

#[test]
fn test_or_node_branch_count() {
    let exprs = parse_filter("publication_year:2019|2020|2021|2022");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    match pred {
        Predicate::Or(branches) => assert_eq!(branches.len(), 4),
        other => panic!("expected Or node, got {:?}", other),
    }
}

#[test]
fn test_authorships_elem_match() {
    let exprs = parse_filter("authorships.author.id:https://example.org/A99");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "authorships": { "$elemMatch": { "author.id": { "$eq": "A99" } } } })
    );
}

#[test]
fn test_institutions_elem_match() {
    let exprs = parse_filter("institutions.country_code:us");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "institutions": { "$elemMatch": { "country_code": { "$eq": "us" } } } })
    );
}

#[test]
fn test_concepts_elem_match() {
    let exprs = parse_filter("concepts.level:2");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "concepts": { "$elemMatch": { "level": { "$eq": "2" } } } })
    );
}

#[test]
fn test_source_matches_both_locations() {
    let exprs = parse_filter("source.type:journal");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "$or": [
            { "primary_location.source.type": { "$eq": "journal" } },
            { "locations.source.type": { "$eq": "journal" } }
        ] })
    );
}

#[test]
fn test_has_doi_is_existence_check() {
    let exprs = parse_filter("has_doi:true");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "ids.doi": { "$exists": true } }));

    let exprs = parse_filter("has_doi:false");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "ids.doi": { "$exists": false } }));
}

#[test]
fn test_has_pdf_maps_to_open_access_flag() {
    // Current behavior inherited from upstream: has_pdf is conflated with
    // open-access status.
    let exprs = parse_filter("has_pdf:true");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "open_access.is_oa": true }));
}

#[test]
fn test_has_references_non_empty() {
    let exprs = parse_filter("has_references:true");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "referenced_works": { "$exists": true, "$ne": [] } })
    );
}

#[test]
fn test_is_oa_aliases() {
    for field in ["is_oa", "open_access.is_oa"] {
        let exprs = parse_filter(&format!("{}:true", field));
        let pred = build_expression_predicate(&exprs[0]).unwrap();
        assert_eq!(pred.to_query_doc(), json!({ "open_access.is_oa": true }));
    }
}

#[test]
fn test_publication_date_bounds() {
    let exprs = parse_filter("from_publication_date:>=2020-01-01,to_publication_date:<=2021-12-31");
    let preds: Vec<_> = exprs
        .iter()
        .filter_map(build_expression_predicate)
        .collect();
    assert_eq!(
        preds[0].to_query_doc(),
        json!({ "publication_date": { "$gte": "2020-01-01" } })
    );
    assert_eq!(
        preds[1].to_query_doc(),
        json!({ "publication_date": { "$lte": "2021-12-31" } })
    );
}

#[test]
fn test_language_lowercased() {
    let exprs = parse_filter("language:EN");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "language": "en" }));
}

#[test]
fn test_cites_extracts_short_work_id() {
    let exprs = parse_filter("cites:https://example.org/W4242");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "referenced_works": "W4242" }));

    let exprs = parse_filter("cites.id:W4242");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "referenced_works": "W4242" }));
}

#[test]
fn test_plain_dotted_path_compares_in_place() {
    let exprs = parse_filter("summary_stats.h_index:>50");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "summary_stats.h_index": { "$gt": "50" } })
    );
}

#[test]
fn test_search_operator_builds_regex() {
    let exprs = parse_filter("display_name.search:smith");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "display_name": { "$regex": "smith", "$options": "i" } })
    );
}

#[test]
fn test_exact_operator_builds_literal_equality() {
    let exprs = parse_filter("display_name.equals:Nature");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "display_name": "Nature" }));
}

#[test]
fn test_null_equality_and_inequality() {
    let exprs = parse_filter("doi:null");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "doi": null }));

    let exprs = parse_filter("doi:!=null");
    let pred = build_expression_predicate(&exprs[0]).unwrap();
    assert_eq!(pred.to_query_doc(), json!({ "doi": { "$ne": null } }));
}

#[test]
fn test_null_with_comparison_operator_dropped() {
    let exprs = parse_filter("publication_year:>null");
    assert_eq!(exprs.len(), 1);
    assert!(build_expression_predicate(&exprs[0]).is_none());
}

#[test]
fn test_same_field_twice_wraps_in_and() {
    let pred = parse_filter_predicate(Some("type:journal-article,type:book")).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({ "$and": [
            { "type": { "$eq": "book" } },
            { "type": { "$eq": "journal-article" } }
        ] })
    );
}

#[test]
fn test_end_to_end_scenario() {
    let pred = parse_filter_predicate(Some("publication_year:2020|2021,cited_by_count:>100")).unwrap();
    assert_eq!(
        pred.to_query_doc(),
        json!({
            "$or": [
                { "publication_year": { "$eq": 2020 } },
                { "publication_year": { "$eq": 2021 } }
            ],
            "cited_by_count": { "$gt": 100 }
        })
    );
}

#[test]
fn test_two_or_lists_collide_on_or_key() {
    // Both fragments serialize under $or, so the second is routed into $and
    // rather than overwriting the first.
    let pred =
        parse_filter_predicate(Some("publication_year:2020|2021,type:book|monograph")).unwrap();
    let doc = pred.to_query_doc();
    let and = doc["$and"].as_array().expect("expected $and wrapper");
    assert_eq!(and.len(), 2);
    assert!(and.iter().all(|clause| clause.get("$or").is_some()));
}

#[test]
fn test_or_list_elements_coerced_independently() {
    let exprs = parse_filter("publication_year:2020|unknown");
    assert_eq!(
        exprs[0].value,
        FilterOperand::Many(vec![
            FilterValue::Int(2020),
            FilterValue::Str("unknown".into())
        ])
    );
}

#[test]
fn test_empty_filter_builds_nothing() {
    assert!(parse_filter_predicate(None).is_none());
    assert!(parse_filter_predicate(Some("")).is_none());
    assert!(build_filter_predicate(&[]).is_none());
}
