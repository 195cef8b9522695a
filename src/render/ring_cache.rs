use tracing::debug;

/// Where a cached upload landed, and which generation of the ring it belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheRange {
    /// Offset in the ring's units (bytes or indices).
    pub offset: u32,
    /// Generation the data was written under. `0` is never a live generation.
    pub generation: u32,
}

/// Write cursor and generation counter of a fixed-capacity ring buffer.
///
/// Allocations are bump-allocated from the cursor. When one does not fit in the remaining space
/// the cursor wraps to zero and the generation advances by two, so every range handed out before
/// the wrap stops matching. Generations start at 1 and stay odd; a zeroed [`CacheRange`] is
/// therefore always stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingCache {
    capacity: u32,
    pos: u32,
    generation: u32,
}

impl RingCache {
    /// Empty ring of `capacity` units.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            pos: 0,
            generation: 1,
        }
    }

    /// Total capacity in units.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Current write cursor.
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// Current generation.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether data previously placed at `range` is still intact.
    pub fn is_valid(&self, range: CacheRange) -> bool {
        range.generation == self.generation
    }

    /// Reserve `len` units, wrapping (and invalidating everything) when the tail is too short.
    /// Returns `None` only if `len` exceeds the whole capacity.
    pub fn reserve(&mut self, len: u32) -> Option<CacheRange> {
        if len > self.capacity {
            return None;
        }

        if len > self.capacity - self.pos {
            self.pos = 0;
            self.generation = self.generation.wrapping_add(2);
            debug!(generation = self.generation, "ring cache wrapped");
        }

        let offset = self.pos;
        self.pos += len;
        Some(CacheRange {
            offset,
            generation: self.generation,
        })
    }

    /// Drop everything cached so far without moving to a fresh region.
    pub fn invalidate(&mut self) {
        self.pos = 0;
        self.generation = self.generation.wrapping_add(2);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/ring_cache.rs"]
mod tests;
