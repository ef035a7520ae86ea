pub mod definition;
pub mod error;
pub mod registry;
pub mod watcher;

pub use definition::{parse_document, AgentDefinition};
pub use error::AgentError;
pub use registry::{AgentInstance, AgentRegistry, AgentSource};
pub use watcher::AgentWatcher;
