use super::types::{FilterExpression, FilterOperand, FilterOperator, FilterValue};

/// Operator markers in detection priority order. Multi-character markers come
/// before the bare colon so `cited_by_count:>=100` resolves to gte rather
/// than a mangled equality. Detection follows this order through the marker
/// set, not leftmost string position.
const OPERATOR_MARKERS: &[(&str, FilterOperator)] = &[
    (">=", FilterOperator::Gte),
    ("<=", FilterOperator::Lte),
    ("!=", FilterOperator::Ne),
    (".search:", FilterOperator::Search),
    (".equals:", FilterOperator::Exact),
    (">", FilterOperator::Gt),
    ("<", FilterOperator::Lt),
    (":", FilterOperator::Eq),
];

/// Fields whose values are integers.
const INT_FIELDS: &[&str] = &[
    "publication_year",
    "cited_by_count",
    "works_count",
    "level",
    "h_index",
    "i10_index",
    "counts",
    "year",
    "volume",
    "issue",
];

/// Fields carrying boolean flags; a dotted path ending in one of these is
/// also boolean.
const BOOL_FIELDS: &[&str] = &[
    "has_doi",
    "has_pdf",
    "has_references",
    "is_oa",
    "is_retracted",
    "has_fulltext",
    "is_paratext",
];

/// Coerces a raw value string based on the field name. Total: never fails.
///
/// Precedence: explicit null > boolean fields > integer fields > short-id
/// extraction > string passthrough.
pub fn coerce_filter_value(field: &str, raw: &str) -> FilterValue {
    if raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("none") {
        return FilterValue::Null;
    }

    if is_boolean_field(field) {
        let truthy = ["true", "1", "yes", "t"]
            .iter()
            .any(|t| raw.eq_ignore_ascii_case(t));
        return FilterValue::Bool(truthy);
    }

    if INT_FIELDS.contains(&field) {
        match raw.parse::<i64>() {
            Ok(n) => return FilterValue::Int(n),
            Err(_) => {
                tracing::debug!(field, value = raw, "integer coercion failed, keeping string");
            }
        }
    }

    if (field == "id" || field.ends_with(".id")) && raw.contains('/') {
        if let Some(short) = raw.rsplit('/').next() {
            return FilterValue::Str(short.to_string());
        }
    }

    FilterValue::Str(raw.to_string())
}

fn is_boolean_field(field: &str) -> bool {
    BOOL_FIELDS.contains(&field)
        || BOOL_FIELDS
            .iter()
            .any(|bf| field.ends_with(&format!(".{}", bf)))
}

/// Undoes URL query-string encoding: `+` becomes a space, then percent
/// escapes are decoded. A malformed escape keeps the raw text.
fn decode_value(raw: &str) -> String {
    let plussed = raw.replace('+', " ");
    match urlencoding::decode(&plussed) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plussed,
    }
}

/// Parses one `field<op>value` expression. Returns None when no operator
/// marker is present or the field side is empty; callers drop such pieces.
fn parse_expression(expr: &str) -> Option<FilterExpression> {
    let (marker, operator) = OPERATOR_MARKERS
        .iter()
        .find(|(marker, _)| expr.contains(marker))?;

    let (field, raw_value) = expr.split_once(marker)?;
    // The wire grammar writes comparisons as `field:>value`, so the field
    // side keeps one trailing colon.
    let field = field.strip_suffix(':').unwrap_or(field).trim();
    if field.is_empty() {
        return None;
    }

    let value = decode_value(raw_value.trim());
    let operand = if value.contains('|') {
        FilterOperand::Many(
            value
                .split('|')
                .map(|v| coerce_filter_value(field, v.trim()))
                .collect(),
        )
    } else {
        FilterOperand::One(coerce_filter_value(field, &value))
    };

    Some(FilterExpression::new(field.to_string(), *operator, operand))
}

/// Parses a comma-separated filter string into expressions. Unparseable
/// pieces are dropped, never fatal.
pub fn parse_filter(filter: &str) -> Vec<FilterExpression> {
    filter
        .split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .filter_map(|piece| {
            let parsed = parse_expression(piece);
            if parsed.is_none() {
                tracing::debug!(expression = piece, "dropping unparseable filter expression");
            }
            parsed
        })
        .collect()
}
