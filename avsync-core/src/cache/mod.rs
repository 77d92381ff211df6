//! Contiguous frame cache module
//!
//! A fixed-size ring of assembled frames. The cached positions always form
//! one ascending run without gaps, so a lookup is a single offset
//! calculation from the oldest slot.

use crate::error::{Error, Result};
use crate::frame::{FrameHandle, Position};

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Frames currently cached
    pub entries: usize,

    /// Slot count
    pub capacity: usize,

    /// Lookup hit count
    pub hit_count: u64,

    /// Lookup miss count
    pub miss_count: u64,

    /// Frames dropped to make room for a successor
    pub eviction_count: u64,

    /// Whole-window purges
    pub purge_count: u64,

    /// Payload bytes held by cached frames
    pub memory_usage_bytes: u64,
}

impl CacheStatistics {
    /// Total lookups
    pub fn total_accesses(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            return 0.0;
        }
        self.hit_count as f64 / total as f64
    }
}

/// Bounded ring buffer of consecutive frames with FIFO eviction
pub struct FrameCache {
    /// Ring storage; occupied slots are `start..start + count` (mod len)
    slots: Vec<Option<FrameHandle>>,

    /// Index of the oldest frame
    start: usize,

    /// Number of occupied slots
    count: usize,

    capacity: usize,

    hits: u64,
    misses: u64,
    evictions: u64,
    purges: u64,
}

impl FrameCache {
    /// Create a cache holding at most `capacity` frames
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::InvalidCapacity(capacity));
        }

        Ok(Self {
            slots: vec![None; capacity],
            start: 0,
            count: 0,
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
            purges: 0,
        })
    }

    fn slot_index(&self, position: Position) -> Option<usize> {
        let earliest = self.earliest_position()?;
        let offset = position - earliest;
        if offset < 0 || offset >= self.count as i64 {
            return None;
        }
        Some((self.start + offset as usize) % self.capacity)
    }

    /// Shared handle to the frame at `position`, if cached
    pub fn get(&mut self, position: Position) -> Option<FrameHandle> {
        let frame = self
            .slot_index(position)
            .and_then(|index| self.slots[index].clone());

        if frame.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        frame
    }

    /// Record a lookup that had to wait for production
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Whether `position` lies inside the cached window
    pub fn contains(&self, position: Position) -> bool {
        self.slot_index(position).is_some()
    }

    /// Insert a frame, keeping the window contiguous.
    ///
    /// The direct successor of the newest frame is appended (evicting the
    /// oldest one when full). Any other position not already cached
    /// replaces the whole window.
    pub fn put(&mut self, frame: FrameHandle) {
        if self.slots.is_empty() {
            return;
        }

        let position = frame.position;
        if self.contains(position) {
            return;
        }

        match self.latest_position() {
            None => self.insert_sole(frame),
            Some(latest) if position == latest + 1 => {
                if self.count < self.capacity {
                    let index = (self.start + self.count) % self.capacity;
                    self.slots[index] = Some(frame);
                    self.count += 1;
                } else {
                    self.slots[self.start] = Some(frame);
                    self.start = (self.start + 1) % self.capacity;
                    self.evictions += 1;
                }
            }
            Some(_) => {
                self.purge();
                self.insert_sole(frame);
            }
        }
    }

    fn insert_sole(&mut self, frame: FrameHandle) {
        self.slots[self.start] = Some(frame);
        self.count = 1;
    }

    /// Position of the oldest cached frame
    pub fn earliest_position(&self) -> Option<Position> {
        if self.count == 0 {
            return None;
        }
        self.slots[self.start].as_ref().map(|f| f.position)
    }

    /// Position of the newest cached frame
    pub fn latest_position(&self) -> Option<Position> {
        if self.count == 0 {
            return None;
        }
        let index = (self.start + self.count - 1) % self.capacity;
        self.slots[index].as_ref().map(|f| f.position)
    }

    /// Drop every cached frame
    pub fn purge(&mut self) {
        if self.count > 0 {
            self.purges += 1;
        }
        for offset in 0..self.count {
            let index = (self.start + offset) % self.capacity;
            self.slots[index] = None;
        }
        self.count = 0;
    }

    /// Purge and release the slot storage. Later puts are ignored.
    pub fn close(&mut self) {
        self.purge();
        self.slots = Vec::new();
        self.start = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get statistics
    pub fn statistics(&self) -> CacheStatistics {
        let memory: usize = self
            .slots
            .iter()
            .flatten()
            .map(|frame| frame.memory_size())
            .sum();

        CacheStatistics {
            entries: self.count,
            capacity: self.capacity,
            hit_count: self.hits,
            miss_count: self.misses,
            eviction_count: self.evictions,
            purge_count: self.purges,
            memory_usage_bytes: memory as u64,
        }
    }
}
