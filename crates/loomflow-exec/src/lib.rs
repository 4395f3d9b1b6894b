//! Flow execution — drives a generated flow document through its
//! dependency graph with bounded parallelism, retries, review gating, and
//! rollback, emitting status events over a broadcast bus.

pub mod executor;
pub mod retry;
pub mod review;

pub use executor::{ExecutionReport, FlowExecutor, NodeReport, NodeWorker, WorkOutput};
pub use retry::RetryPolicy;
pub use review::ReviewBroker;
