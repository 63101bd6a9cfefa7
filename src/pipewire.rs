mod manager;
mod state;
mod types;

// Re-export public types
pub use state::{GraphSnapshot, GraphState};
pub use types::*;

// Re-export the start function and thread handle
pub use manager::{PwHandle, PwStatus, start};
