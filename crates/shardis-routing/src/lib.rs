//! Consistent-hash routing on top of a pluggable [`AssignmentStore`].

mod router;

pub use router::{RouteOutcome, Router};
