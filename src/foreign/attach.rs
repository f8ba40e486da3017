use super::runtime::ForeignRuntime;
use crate::error::Result;

/// Scoped attachment of the current native thread to the foreign runtime.
///
/// Detaches on drop, but only if this guard did the attaching: a thread
/// that arrived already attached (a caller thread coming from the foreign
/// side) stays attached.
pub struct AttachGuard<'a, R: ForeignRuntime> {
    runtime: &'a R,
    detach_on_drop: bool,
}

impl<'a, R: ForeignRuntime> AttachGuard<'a, R> {
    pub fn attach(runtime: &'a R) -> Result<Self> {
        let detach_on_drop = runtime.attach_current_thread()?;
        if detach_on_drop {
            log::trace!(
                "Attached thread {:?} to the foreign runtime",
                std::thread::current().id()
            );
        }
        Ok(Self {
            runtime,
            detach_on_drop,
        })
    }
}

impl<R: ForeignRuntime> Drop for AttachGuard<'_, R> {
    fn drop(&mut self) {
        if self.detach_on_drop {
            self.runtime.detach_current_thread();
            log::trace!(
                "Detached thread {:?} from the foreign runtime",
                std::thread::current().id()
            );
        }
    }
}
