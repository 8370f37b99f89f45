//! Build Executor (C5).

mod execute;
mod types;

pub use execute::{BuildError, realize};
pub use types::{BuildNode, BuildOutputs};
