mod executor;
mod merge;
mod model;
mod paging;
mod source;

pub use executor::QueryExecutor;
pub use merge::{merge_ordered, merge_unordered};
pub use model::{Predicate, QueryModel};
pub use paging::{AdaptivePager, PagingConfig};
pub use source::{ItemStream, ShardQuerySource};
