pub mod errors;
pub mod factory;
pub mod orchestrator;

pub use errors::PipelineError;
pub use factory::AppFactory;
pub use orchestrator::{Orchestrator, SearchOverrides};
