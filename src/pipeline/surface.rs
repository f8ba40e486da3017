//! Window hand-off for video output elements.
//!
//! A video output may keep rendering into its outgoing window for a short
//! while after a new one is set, so the binder holds two slots: the window
//! currently bound and the one it replaced. The replaced window is released
//! only when it is pushed out by a further replacement or on finalize.

use crate::engine::{Engine, EngineStatus, WindowHandle};
use crate::foreign::PlatformWindow;

/// The element side of a window binding.
pub trait VideoOverlay {
    fn set_window_handle(&self, window: Option<WindowHandle>) -> Result<(), EngineStatus>;
    fn expose(&self) -> Result<(), EngineStatus>;
}

/// [`VideoOverlay`] for an engine element handle.
pub struct ElementOverlay<'a, E: Engine> {
    pub engine: &'a E,
    pub element: &'a E::Element,
}

impl<E: Engine> VideoOverlay for ElementOverlay<'_, E> {
    fn set_window_handle(&self, window: Option<WindowHandle>) -> Result<(), EngineStatus> {
        self.engine.set_window_handle(self.element, window)
    }

    fn expose(&self) -> Result<(), EngineStatus> {
        self.engine.expose(self.element)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Unbound,
    Bound,
    /// A new window is bound while the one it replaced is still held.
    PendingReplace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The window was handed to the element.
    Bound,
    /// Same window as the bound one; only a redraw was requested.
    Redrawn,
}

pub struct SurfaceBinding<W: PlatformWindow> {
    current: Option<W>,
    previous: Option<W>,
}

impl<W: PlatformWindow> SurfaceBinding<W> {
    pub fn new() -> Self {
        Self {
            current: None,
            previous: None,
        }
    }

    pub fn state(&self) -> SurfaceState {
        match (&self.current, &self.previous) {
            (None, None) => SurfaceState::Unbound,
            (Some(_), None) => SurfaceState::Bound,
            _ => SurfaceState::PendingReplace,
        }
    }

    pub fn current_handle(&self) -> Option<WindowHandle> {
        self.current.as_ref().map(|w| w.raw_handle())
    }

    pub fn previous_handle(&self) -> Option<WindowHandle> {
        self.previous.as_ref().map(|w| w.raw_handle())
    }

    /// Bind `window`, or request a redraw if it is already the bound one.
    ///
    /// The binding keeps ownership of `window` even if the element rejects
    /// it, so it is still released on finalize.
    pub fn initialize(
        &mut self,
        window: W,
        overlay: &dyn VideoOverlay,
    ) -> Result<BindOutcome, EngineStatus> {
        let handle = window.raw_handle();

        if self.current_handle() == Some(handle) {
            // Duplicate reference to the bound window; drop it.
            drop(window);
            overlay.expose()?;
            return Ok(BindOutcome::Redrawn);
        }

        if let Some(outgoing) = self.current.take() {
            // Any older previous window is released here.
            self.previous = Some(outgoing);
        }
        self.current = Some(window);
        overlay.set_window_handle(Some(handle))?;
        Ok(BindOutcome::Bound)
    }

    /// Unbind from the element and release both held windows.
    ///
    /// The windows are released even when unbinding fails.
    pub fn finalize(&mut self, overlay: &dyn VideoOverlay) -> Result<(), EngineStatus> {
        let result = overlay.set_window_handle(None);
        self.release();
        result
    }

    /// Release both windows without touching the element.
    pub fn release(&mut self) {
        self.previous = None;
        self.current = None;
    }
}

impl<W: PlatformWindow> Default for SurfaceBinding<W> {
    fn default() -> Self {
        Self::new()
    }
}
