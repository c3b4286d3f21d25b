mod group;
mod predicate;
mod select;
mod sort;

pub use group::GroupSpec;
pub use predicate::{CmpOp, Predicate};
pub use select::Projection;
pub use sort::{SortDirection, SortKey, SortSpec, RELEVANCE_SORT_FIELD};
