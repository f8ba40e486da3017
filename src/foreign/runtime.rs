use thiserror::Error;

use crate::engine::{TensorsData, TensorsInfo, WindowHandle};
use crate::error::Result;

/// An exception raised by foreign code during a call.
///
/// By the time this value exists the runtime has already cleared the
/// pending exception, so the calling thread is back in a clean state.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ForeignException {
    pub message: String,
}

impl ForeignException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A native window reference acquired from a foreign surface object.
///
/// Holding the value keeps one platform reference on the window; dropping
/// it releases that reference.
pub trait PlatformWindow: Send + Sync {
    fn raw_handle(&self) -> WindowHandle;
}

/// The managed runtime the bridge calls into.
///
/// Every object-typed associated type is a strong reference: holding one
/// keeps the foreign object alive across calls and threads, dropping it
/// releases the reference. Bindings whose release needs an attached thread
/// must arrange that in their `Drop`; the bridge only drops foreign values
/// while holding an [`AttachGuard`](super::AttachGuard).
pub trait ForeignRuntime: Send + Sync + 'static {
    /// The foreign object a pipeline or custom filter reports to.
    type Instance: Send + Sync;
    /// Any other foreign object (converted descriptors and data).
    type Object: Send + Sync;
    /// Resolved entry point on the instance.
    type MethodId: Copy + Send + Sync;
    /// Foreign object a window can be obtained from.
    type Surface: ?Sized;
    type Window: PlatformWindow;

    /// Attach the calling native thread. Returns `true` if this call did
    /// the attaching, `false` if the thread was attached already.
    fn attach_current_thread(&self) -> Result<bool>;
    fn detach_current_thread(&self);

    /// Look up an entry point on the instance by name and signature.
    fn method_id(
        &self,
        instance: &Self::Instance,
        name: &str,
        signature: &str,
    ) -> Result<Self::MethodId>;

    /// Build the foreign counterpart of a native descriptor.
    fn convert_info(&self, info: &TensorsInfo) -> Result<Self::Object>;
    /// Build a foreign data object shaped by an already converted descriptor.
    fn convert_data(&self, data: &TensorsData, info: &Self::Object) -> Result<Self::Object>;
    /// Copy a foreign data object back into native buffers.
    fn parse_data(&self, data: &Self::Object) -> Result<TensorsData>;

    /// Acquire the native window behind a surface, if it has one.
    fn window_from_surface(&self, surface: &Self::Surface) -> Option<Self::Window>;

    fn call_state_changed(
        &self,
        instance: &Self::Instance,
        method: Self::MethodId,
        state: i32,
    ) -> std::result::Result<(), ForeignException>;

    fn call_new_data(
        &self,
        instance: &Self::Instance,
        method: Self::MethodId,
        sink_name: &str,
        data: &Self::Object,
    ) -> std::result::Result<(), ForeignException>;

    /// Returns `None` when the foreign side asks to drop the buffer.
    fn call_invoke(
        &self,
        instance: &Self::Instance,
        method: Self::MethodId,
        input: &Self::Object,
    ) -> std::result::Result<Option<Self::Object>, ForeignException>;
}
