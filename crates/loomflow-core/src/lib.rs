pub mod catalog;
pub mod error;
pub mod event;
pub mod types;

pub use catalog::{AgentCatalog, AgentDescriptor};
pub use error::{FlowError, Result};
pub use event::EventBus;
pub use types::*;
