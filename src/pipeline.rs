mod cache;
mod callback;
mod context;
mod manager;
mod registry;
mod surface;

pub use cache::DescriptorCache;
pub use context::PipelineContext;
pub use manager::{ContextHandle, FilterHandle, PipelineManager};
pub use registry::{ElementEntry, ElementHandle, ElementRegistry, EntryData, EntryState, EntryToken};
pub use surface::{BindOutcome, ElementOverlay, SurfaceBinding, SurfaceState, VideoOverlay};
