/// AST types for the filter expression language
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,     // field:value
    Gt,     // field:>value
    Lt,     // field:<value
    Gte,    // field:>=value
    Lte,    // field:<=value
    Ne,     // field:!=value
    Search, // field.search:value (case-insensitive substring)
    Exact,  // field.equals:value (literal equality)
}

/// A coerced filter value. Coercion is total: every raw string maps to one of
/// these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl FilterValue {
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Str(s) => Value::String(s.clone()),
            FilterValue::Int(i) => Value::from(*i),
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Null => Value::Null,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// String form used where a predicate needs raw text (substring patterns).
    pub fn to_text(&self) -> String {
        match self {
            FilterValue::Str(s) => s.clone(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Null => String::new(),
        }
    }
}

/// A single coerced value, or a `|`-delimited OR-list.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOperand {
    One(FilterValue),
    Many(Vec<FilterValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterOperand,
}

impl FilterExpression {
    pub fn new(field: String, operator: FilterOperator, value: FilterOperand) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }
}
