mod builder;
mod parser;
mod types;

pub use builder::{build_expression_predicate, build_filter_predicate, parse_filter_predicate};
pub use parser::{coerce_filter_value, parse_filter};
pub use types::{FilterExpression, FilterOperand, FilterOperator, FilterValue};

#[cfg(test)]
mod tests;
