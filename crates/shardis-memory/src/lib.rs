mod assignment_store;
mod checkpoint_store;
mod data_store;
mod health_probe;
mod query_source;
mod resource_factory;

pub use assignment_store::InMemoryAssignmentStore;
pub use checkpoint_store::InMemoryCheckpointStore;
pub use data_store::{ChecksumVerifier, InMemoryShardStore};
pub use health_probe::InMemoryHealthProbe;
pub use query_source::InMemoryQuerySource;
pub use resource_factory::InMemoryResourceFactory;
