//! Per-context element table.
//!
//! Every element handle the bridge acquires lives in exactly one
//! [`ElementEntry`], and every entry lives in the registry of the context
//! that created it. Release is centralized: entries are only destroyed by
//! [`ElementRegistry::release_all`] (context teardown) or, for sinks, by
//! [`ElementRegistry::remove_sink`]. Both hand the handle back to the
//! engine through its release call.
//!
//! ## Locking
//!
//! The table mutex guards `live`, the name map and the token index. It is
//! held for lookups, inserts and removals only, never across a foreign call.
//! Each entry carries its own lock around its handle and private data. A
//! delivery or surface call holds it exclusively; a control call holds a
//! recursive read lock for the engine call, so a listener fired on that
//! thread may control the same element again. Teardown takes it exclusively
//! before destroying the entry, which is how teardown waits for in-flight
//! callbacks and control calls.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::cache::DescriptorCache;
use super::surface::{ElementOverlay, SurfaceBinding};
use crate::engine::{ElementKind, Engine, EngineStatus, SwitchKind};
use crate::error::{BridgeError, Result};
use crate::foreign::ForeignRuntime;

/// Stable identifier handed to engine listeners in place of an address.
pub type EntryToken = u64;

/// An owned engine handle, tagged by kind.
pub enum ElementHandle<E: Engine> {
    Source(E::Source),
    Sink(E::Sink),
    Switch { kind: SwitchKind, handle: E::Switch },
    Valve(E::Valve),
    VideoSink(E::Element),
}

impl<E: Engine> ElementHandle<E> {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Source(_) => ElementKind::Source,
            Self::Sink(_) => ElementKind::Sink,
            Self::Switch { .. } => ElementKind::Switch,
            Self::Valve(_) => ElementKind::Valve,
            Self::VideoSink(_) => ElementKind::VideoSink,
        }
    }

    /// Hand the handle back through the release call for its kind.
    pub fn release(self, engine: &E) -> std::result::Result<(), EngineStatus> {
        match self {
            Self::Source(h) => engine.release_source(h),
            Self::Sink(h) => engine.sink_unregister(h),
            Self::Switch { handle, .. } => engine.release_switch(handle),
            Self::Valve(h) => engine.release_valve(h),
            Self::VideoSink(h) => engine.release_element(h),
        }
    }
}

/// Bridge-private data attached to an entry. Dropping it is the destructor.
pub enum EntryData<R: ForeignRuntime> {
    None,
    /// Output descriptor cache for a sink's deliveries.
    Sink(DescriptorCache<R::Object>),
    VideoSink(SurfaceBinding<R::Window>),
}

impl<R: ForeignRuntime> EntryData<R> {
    fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Sink => Self::Sink(DescriptorCache::new()),
            ElementKind::VideoSink => Self::VideoSink(SurfaceBinding::new()),
            _ => Self::None,
        }
    }
}

pub struct EntryState<E: Engine, R: ForeignRuntime> {
    pub handle: Option<ElementHandle<E>>,
    pub data: EntryData<R>,
    retired: bool,
}

pub struct ElementEntry<E: Engine, R: ForeignRuntime> {
    name: String,
    kind: ElementKind,
    token: EntryToken,
    state: RwLock<EntryState<E, R>>,
}

impl<E: Engine, R: ForeignRuntime> ElementEntry<E, R> {
    fn new(name: &str, token: EntryToken, handle: ElementHandle<E>) -> Self {
        let kind = handle.kind();
        Self {
            name: name.to_string(),
            kind,
            token,
            state: RwLock::new(EntryState {
                handle: Some(handle),
                data: EntryData::for_kind(kind),
                retired: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn token(&self) -> EntryToken {
        self.token
    }

    /// Lock the entry's state exclusively, or `None` once the entry has
    /// been retired.
    ///
    /// Blocks while another thread (a delivery, a control call or teardown)
    /// holds it.
    pub fn lock(&self) -> Option<RwLockWriteGuard<'_, EntryState<E, R>>> {
        let state = self.state.write();
        if state.retired { None } else { Some(state) }
    }

    /// Shared access to the handle for a control call, or `None` once the
    /// entry has been retired.
    ///
    /// Recursive: succeeds on a thread that already holds a read guard on
    /// this entry even while teardown is waiting for it.
    pub fn read(&self) -> Option<RwLockReadGuard<'_, EntryState<E, R>>> {
        let state = self.state.read_recursive();
        if state.retired { None } else { Some(state) }
    }

    /// Destroy private data and take the handle out. Returns `None` if the
    /// entry was already retired.
    ///
    /// A bound video sink is unbound from its window before the window
    /// references are dropped.
    fn retire(&self, engine: &E) -> Option<ElementHandle<E>> {
        let mut state = self.state.write();
        if state.retired {
            return None;
        }
        state.retired = true;

        let state = &mut *state;
        if let (EntryData::VideoSink(binding), Some(ElementHandle::VideoSink(element))) =
            (&mut state.data, &state.handle)
            && binding.current_handle().is_some()
        {
            let overlay = ElementOverlay { engine, element };
            if let Err(e) = binding.finalize(&overlay) {
                log::warn!("Failed to unbind window from {}: {}", self.name, e);
            }
        }
        state.data = EntryData::None;
        state.handle.take()
    }
}

struct RegistryTable<E: Engine, R: ForeignRuntime> {
    live: bool,
    next_token: EntryToken,
    by_name: HashMap<String, Arc<ElementEntry<E, R>>>,
    by_token: HashMap<EntryToken, Arc<ElementEntry<E, R>>>,
}

pub struct ElementRegistry<E: Engine, R: ForeignRuntime> {
    table: Mutex<RegistryTable<E, R>>,
}

impl<E: Engine, R: ForeignRuntime> ElementRegistry<E, R> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(RegistryTable {
                live: true,
                next_token: 1,
                by_name: HashMap::new(),
                by_token: HashMap::new(),
            }),
        }
    }

    pub fn is_live(&self) -> bool {
        self.table.lock().live
    }

    pub fn len(&self) -> usize {
        self.table.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<Arc<ElementEntry<E, R>>> {
        let table = self.table.lock();
        if !table.live {
            return None;
        }
        table.by_name.get(name).cloned()
    }

    /// Find the entry a listener token was issued for. `None` once the
    /// context is tearing down or the entry was removed.
    pub fn entry_by_token(&self, token: EntryToken) -> Option<Arc<ElementEntry<E, R>>> {
        let table = self.table.lock();
        if !table.live {
            return None;
        }
        table.by_token.get(&token).cloned()
    }

    /// Return the entry for `name`, acquiring its handle on first use.
    ///
    /// `acquire` receives the token the new entry will carry and must either
    /// return a handle of kind `kind` or release whatever it acquired and
    /// fail. It runs with the table locked, so concurrent resolves of the
    /// same name acquire exactly once.
    pub fn resolve(
        &self,
        name: &str,
        kind: ElementKind,
        acquire: impl FnOnce(EntryToken) -> Result<ElementHandle<E>>,
    ) -> Result<Arc<ElementEntry<E, R>>> {
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "element name is empty".to_string(),
            ));
        }

        let mut table = self.table.lock();
        if !table.live {
            return Err(BridgeError::InvalidArgument(
                "pipeline is being destroyed".to_string(),
            ));
        }

        if let Some(entry) = table.by_name.get(name) {
            if entry.kind != kind {
                return Err(BridgeError::resolution(
                    name,
                    kind,
                    format!("already registered as a {}", entry.kind),
                ));
            }
            return Ok(entry.clone());
        }

        let token = table.next_token;
        table.next_token += 1;

        let handle = acquire(token)?;
        let entry = Arc::new(ElementEntry::new(name, token, handle));
        table.by_name.insert(name.to_string(), entry.clone());
        table.by_token.insert(token, entry.clone());

        log::debug!("Registered {} '{}' (token {})", kind, name, token);
        Ok(entry)
    }

    /// Remove a sink entry and unregister its listener from the engine.
    ///
    /// Blocks until an in-flight delivery for this sink finishes. The
    /// engine release runs after the entry lock is dropped, so a delivery
    /// queued behind it sees the entry retired and returns. Returns `false`
    /// if no sink with that name is registered.
    pub fn remove_sink(&self, name: &str, engine: &E) -> bool {
        let entry = {
            let mut table = self.table.lock();
            match table.by_name.get(name) {
                Some(entry) if entry.kind == ElementKind::Sink => {}
                _ => return false,
            }
            let Some(entry) = table.by_name.remove(name) else {
                return false;
            };
            table.by_token.remove(&entry.token);
            entry
        };

        let Some(handle) = entry.retire(engine) else {
            return false;
        };
        if let Err(status) = handle.release(engine) {
            log::error!("Failed to unregister sink '{}': {}", name, status);
        }

        log::debug!("Removed sink '{}' (token {})", name, entry.token);
        true
    }

    /// Mark the registry dead and hand back every entry for release.
    ///
    /// Returns `None` if it was already closed; after this no lookup
    /// succeeds, so new callbacks bail out before touching an entry.
    pub fn close(&self) -> Option<Vec<Arc<ElementEntry<E, R>>>> {
        let mut table = self.table.lock();
        if !table.live {
            return None;
        }
        table.live = false;
        table.by_token.clear();
        Some(table.by_name.drain().map(|(_, entry)| entry).collect())
    }

    /// Destroy each entry's private data and release its handle.
    ///
    /// Never fails; each release error is logged and the walk continues.
    /// Returns how many handles were released.
    pub fn release_entries(entries: Vec<Arc<ElementEntry<E, R>>>, engine: &E) -> usize {
        let mut released = 0;
        for entry in entries {
            let Some(handle) = entry.retire(engine) else {
                continue;
            };
            match handle.release(engine) {
                Ok(()) => {
                    log::debug!("Released {} '{}'", entry.kind, entry.name);
                }
                Err(status) => {
                    log::error!(
                        "Failed to release {} '{}': {}",
                        entry.kind,
                        entry.name,
                        status
                    );
                }
            }
            released += 1;
        }
        released
    }

    /// `close` followed by `release_entries`. Safe to call repeatedly and
    /// on an empty table.
    pub fn release_all(&self, engine: &E) -> usize {
        match self.close() {
            Some(entries) => Self::release_entries(entries, engine),
            None => 0,
        }
    }
}

impl<E: Engine, R: ForeignRuntime> Default for ElementRegistry<E, R> {
    fn default() -> Self {
        Self::new()
    }
}
