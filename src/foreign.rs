//! Foreign managed-runtime collaborator
//!
//! - `runtime` - the [`ForeignRuntime`] trait and its value types
//! - `attach` - scoped thread attachment used around every foreign call

mod attach;
mod runtime;

pub use attach::AttachGuard;
pub use runtime::*;
