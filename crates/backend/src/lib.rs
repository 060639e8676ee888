pub mod actor;
pub mod fs;
pub mod launch;

mod engine;
pub use engine::{Engine, EngineError};
