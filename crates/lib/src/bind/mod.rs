//! Bind Driver (C6).

mod execute;
mod state;
mod types;

pub use execute::{BindError, check, create, destroy, update};
pub use state::{BindState, BindStateStore};
pub use types::BindNode;
