//! Memoized descriptor conversion.
//!
//! Descriptors are almost always stable on the data path, while converting
//! one into a foreign object is comparatively expensive. The cache keeps
//! the last native descriptor together with its converted counterpart and
//! reconverts only on a structural change.

use crate::engine::TensorsInfo;

struct Cached<O> {
    info: TensorsInfo,
    object: O,
}

pub struct DescriptorCache<O> {
    cached: Option<Cached<O>>,
    conversions: u64,
}

impl<O> DescriptorCache<O> {
    pub fn new() -> Self {
        Self {
            cached: None,
            conversions: 0,
        }
    }

    /// Return the converted object for `info`, converting only when `info`
    /// differs structurally from the cached descriptor.
    ///
    /// On a conversion error the previous descriptor and object are kept.
    ///
    /// Trailing unit dimensions do not count as a change, so after `[8]`
    /// a descriptor of `[8, 1]` is a hit and the cached object keeps the
    /// rank of the descriptor it was converted from.
    pub fn ensure_converted<E>(
        &mut self,
        info: &TensorsInfo,
        convert: impl FnOnce(&TensorsInfo) -> Result<O, E>,
    ) -> Result<&O, E> {
        let cached = match self.cached.take() {
            Some(hit) if hit.info == *info => hit,
            previous => match convert(info) {
                Ok(object) => {
                    self.conversions += 1;
                    // `previous` drops here, releasing the stale foreign object.
                    Cached {
                        info: info.clone(),
                        object,
                    }
                }
                Err(e) => {
                    self.cached = previous;
                    return Err(e);
                }
            },
        };
        Ok(&self.cached.insert(cached).object)
    }

    pub fn info(&self) -> Option<&TensorsInfo> {
        self.cached.as_ref().map(|c| &c.info)
    }

    pub fn object(&self) -> Option<&O> {
        self.cached.as_ref().map(|c| &c.object)
    }

    /// Number of conversions performed over the cache's lifetime.
    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    pub fn clear(&mut self) {
        self.cached = None;
    }
}

impl<O> Default for DescriptorCache<O> {
    fn default() -> Self {
        Self::new()
    }
}
