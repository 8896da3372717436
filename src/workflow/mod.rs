pub mod builtin;
pub mod registry;
pub mod types;

pub use builtin::{BUILTIN_TEMPLATE_VERSION, builtin_template, builtin_templates};
pub use registry::{RegistryError, WorkflowHandler, WorkflowInvocation, WorkflowRegistry};
pub use types::{WorkflowOverride, WorkflowOverrides, WorkflowTemplate};
