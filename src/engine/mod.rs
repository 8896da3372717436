pub mod error;
pub mod events;
pub mod supervisor;

pub use error::InitializationError;
pub use events::{EngineStream, EventBus, OrchestratorEvent};
pub use supervisor::EngineSupervisor;
