//! Tensor Bridge - element-handle registry and callback bridge
//!
//! Lets a foreign managed runtime drive a native tensor pipeline engine:
//! construct and control pipelines, feed sources, receive sink buffers,
//! flip switches and valves, hand windows to video sinks and register
//! foreign objects as in-pipeline filters.
//!
//! The engine and the runtime are both reached through traits
//! ([`engine::Engine`], [`foreign::ForeignRuntime`]); bindings implement
//! them and drive everything through [`pipeline::PipelineManager`].

pub mod config;
pub mod custom_filter;
pub mod engine;
pub mod error;
pub mod foreign;
pub mod pipeline;


pub use config::BridgeConfig;
pub use custom_filter::CustomFilter;
pub use error::{BridgeError, Result};
pub use pipeline::{ContextHandle, FilterHandle, PipelineManager};

/// Initialize `env_logger`, honoring `RUST_LOG` and falling back to
/// `default_filter`. Later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env).try_init();
}
