//! Evaluate document-database-style JSON query documents against JSON documents.
//!
//! A query document is a JSON object in the shape a document database expects:
//! field paths mapped to operator objects (`{"cited_by_count": {"$gt": 100}}`),
//! implicit equality (`{"type": "journal-article"}`), and the boolean
//! combinators `$and` / `$or`. Dotted paths descend nested objects and fan out
//! over arrays, so `{"authorships.author.id": "A1"}` matches a document whose
//! `authorships` array contains an element with that author id.

use regex::Regex;
use serde_json::Value;

/// Returns true when `doc` satisfies every clause of `query`.
///
/// An empty query object matches every document. A non-object query matches
/// nothing.
pub fn matches(query: &Value, doc: &Value) -> bool {
    let Value::Object(clauses) = query else {
        return false;
    };
    clauses.iter().all(|(key, cond)| match key.as_str() {
        "$and" => cond
            .as_array()
            .is_some_and(|cs| cs.iter().all(|c| matches(c, doc))),
        "$or" => cond
            .as_array()
            .is_some_and(|cs| cs.iter().any(|c| matches(c, doc))),
        "$text" => cond
            .get("$search")
            .and_then(Value::as_str)
            .is_some_and(|q| text_score(q, doc).is_some()),
        _ => field_matches(doc, key, cond),
    })
}

/// Resolves a dotted field path to every value it reaches in `doc`.
///
/// Object keys that themselves contain dots are tried before descending, and
/// arrays along the path fan out over their elements.
pub fn lookup<'a>(doc: &'a Value, path: &str, out: &mut Vec<&'a Value>) {
    match doc {
        Value::Object(map) => {
            if let Some(v) = map.get(path) {
                out.push(v);
            }
            if let Some((head, rest)) = path.split_once('.') {
                if let Some(v) = map.get(head) {
                    lookup(v, rest, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                lookup(item, path, out);
            }
        }
        _ => {}
    }
}

/// Convenience wrapper returning the first value a path resolves to.
pub fn lookup_first<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut found = Vec::new();
    lookup(doc, path, &mut found);
    found.into_iter().next()
}

fn field_matches(doc: &Value, path: &str, cond: &Value) -> bool {
    let mut found = Vec::new();
    lookup(doc, path, &mut found);

    if let Value::Object(ops) = cond {
        if ops.keys().any(|k| k.starts_with('$')) {
            return ops.iter().all(|(op, arg)| op_matches(&found, op, arg, ops));
        }
    }
    literal_matches(&found, cond)
}

/// Implicit equality. A null condition matches a missing field as well as an
/// explicit null; an array-valued field matches when any element equals the
/// condition.
fn literal_matches(found: &[&Value], cond: &Value) -> bool {
    if cond.is_null() {
        return found.is_empty() || found.iter().any(|v| v.is_null());
    }
    found
        .iter()
        .any(|v| values_equal(v, cond) || array_contains(v, cond))
}

fn op_matches(
    found: &[&Value],
    op: &str,
    arg: &Value,
    all_ops: &serde_json::Map<String, Value>,
) -> bool {
    match op {
        "$eq" => literal_matches(found, arg),
        "$ne" => {
            if arg.is_null() {
                found.iter().any(|v| !v.is_null())
            } else {
                !found
                    .iter()
                    .any(|v| values_equal(v, arg) || array_contains(v, arg))
            }
        }
        "$gt" | "$gte" | "$lt" | "$lte" => found
            .iter()
            .any(|v| scalar_or_elements(v).any(|s| compare_ordered(s, arg, op))),
        "$in" => arg.as_array().is_some_and(|choices| {
            found.iter().any(|v| {
                choices
                    .iter()
                    .any(|c| values_equal(v, c) || array_contains(v, c))
            })
        }),
        "$exists" => {
            let want = arg.as_bool().unwrap_or(true);
            found.is_empty() != want
        }
        "$regex" => {
            let Some(pattern) = arg.as_str() else {
                return false;
            };
            let case_insensitive = all_ops
                .get("$options")
                .and_then(Value::as_str)
                .is_some_and(|o| o.contains('i'));
            found
                .iter()
                .any(|v| scalar_or_elements(v).any(|s| regex_match(s, pattern, case_insensitive)))
        }
        // Handled alongside $regex.
        "$options" => true,
        "$elemMatch" => found.iter().any(|v| {
            v.as_array()
                .is_some_and(|items| items.iter().any(|item| matches(arg, item)))
        }),
        _ => false,
    }
}

fn scalar_or_elements<'a>(v: &'a Value) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
    match v {
        Value::Array(items) => Box::new(items.iter()),
        other => Box::new(std::iter::once(other)),
    }
}

fn array_contains(v: &Value, cond: &Value) -> bool {
    v.as_array()
        .is_some_and(|items| items.iter().any(|item| values_equal(item, cond)))
}

/// Equality with numeric normalization so `1` and `1.0` compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_ordered(value: &Value, bound: &Value, op: &str) -> bool {
    let ordering = match (as_number(value), as_number(bound)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (value.as_str(), bound.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    let Some(ord) = ordering else {
        return false;
    };
    match op {
        "$gt" => ord.is_gt(),
        "$gte" => ord.is_ge(),
        "$lt" => ord.is_lt(),
        "$lte" => ord.is_le(),
        _ => false,
    }
}

/// Numbers, and strings that parse as numbers, take part in numeric
/// comparisons.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn regex_match(v: &Value, pattern: &str, case_insensitive: bool) -> bool {
    let Some(text) = v.as_str() else {
        return false;
    };
    let full = if case_insensitive {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };
    match Regex::new(&full) {
        Ok(re) => re.is_match(text),
        // Unparseable patterns degrade to a substring test.
        Err(_) => {
            if case_insensitive {
                text.to_lowercase().contains(&pattern.to_lowercase())
            } else {
                text.contains(pattern)
            }
        }
    }
}

/// Scores a full-text query against a document, or None when it does not
/// match.
///
/// Terms combine with AND semantics; double-quoted phrases must appear
/// verbatim. The haystack is the document's `search_blob` field when present,
/// otherwise the concatenation of all string leaves. The score is the total
/// number of term occurrences, so documents mentioning the terms more often
/// rank higher.
pub fn text_score(query: &str, doc: &Value) -> Option<f64> {
    let tokens = tokenize_query(query);
    if tokens.is_empty() {
        return None;
    }

    let haystack = match doc.get("search_blob").and_then(Value::as_str) {
        Some(blob) => blob.to_lowercase(),
        None => {
            let mut parts = Vec::new();
            collect_strings(doc, &mut parts);
            parts.join(" ").to_lowercase()
        }
    };

    let mut score = 0usize;
    for token in &tokens {
        let occurrences = haystack.matches(token.as_str()).count();
        if occurrences == 0 {
            return None;
        }
        score += occurrences;
    }
    Some(score as f64)
}

/// Splits a query into lowercase terms, honoring double-quoted phrases.
fn tokenize_query(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = query.trim();
    while let Some(start) = rest.find('"') {
        let before = &rest[..start];
        tokens.extend(before.split_whitespace().map(str::to_lowercase));
        let after = &rest[start + 1..];
        match after.find('"') {
            Some(end) => {
                let phrase = after[..end].trim();
                if !phrase.is_empty() {
                    tokens.push(phrase.to_lowercase());
                }
                rest = &after[end + 1..];
            }
            None => {
                rest = after;
                break;
            }
        }
    }
    tokens.extend(rest.split_whitespace().map(str::to_lowercase));
    tokens.retain(|t| !t.is_empty());
    tokens
}

fn collect_strings<'a>(doc: &'a Value, out: &mut Vec<&'a str>) {
    match doc {
        Value::String(s) => out.push(s),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_strings(v, out);
            }
        }
        _ => {}
    }
}
