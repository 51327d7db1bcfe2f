pub mod handlers;
pub mod router;

pub use handlers::{AppState, FibResponse};
pub use router::create_router;
