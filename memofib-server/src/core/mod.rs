pub mod error;
pub mod fibonacci;
pub mod orchestrator;

pub use error::FibError;
pub use fibonacci::{fibonacci, fibonacci_until};
pub use orchestrator::{CancelPolicy, FibService, Outcome};
