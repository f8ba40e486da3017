//! Native pipeline engine collaborator
//!
//! The engine executes the pipeline on its own threads. The bridge only
//! talks to it through the [`Engine`] trait: synchronous control calls on
//! the caller's thread, and listener closures the engine invokes from its
//! threads.

mod traits;
mod types;

pub use traits::*;
pub use types::*;
