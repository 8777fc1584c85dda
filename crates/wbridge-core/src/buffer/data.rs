//! Growable data region holding variable-length payload bytes.
//!
//! The region starts at [`BufferConfig::DEFAULT_DATA_LEN`] and only ever
//! doubles. Growth releases the old region before allocating the new one, so
//! contents are never preserved and a failed allocation leaves the region
//! unusable until the endpoint is rebuilt.

use crate::config::BufferConfig;
use crate::error::{BridgeError, Result};
use tracing::{debug, error};

/// Source of backing memory for a [`DataRegion`].
pub trait RegionAllocator: Send {
    /// Allocate a zeroed region of exactly `len` bytes.
    fn allocate(&mut self, len: usize) -> Result<Box<[u8]>>;

    /// Return a region previously handed out by [`allocate`](Self::allocate).
    fn release(&mut self, region: Box<[u8]>);
}

/// Allocator backed by the process heap.
///
/// Uses a fallible reservation so an oversized request surfaces as an error
/// instead of aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl RegionAllocator for HeapAllocator {
    fn allocate(&mut self, len: usize) -> Result<Box<[u8]>> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| BridgeError::Allocation { requested: len })?;
        bytes.resize(len, 0);
        Ok(bytes.into_boxed_slice())
    }

    fn release(&mut self, region: Box<[u8]>) {
        drop(region);
    }
}

enum RegionState {
    /// Nothing allocated yet.
    Unallocated,
    Ready(Box<[u8]>),
    /// The old region was released and the replacement could not be allocated.
    Lost,
}

/// The secondary buffer referenced by control-buffer spans.
pub struct DataRegion {
    state: RegionState,
    default_len: usize,
    /// Capacity tracked separately so growth continues from the last size.
    capacity: usize,
    allocator: Box<dyn RegionAllocator>,
}

impl std::fmt::Debug for DataRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            RegionState::Unallocated => "unallocated",
            RegionState::Ready(_) => "ready",
            RegionState::Lost => "lost",
        };
        f.debug_struct("DataRegion")
            .field("state", &state)
            .field("capacity", &self.capacity)
            .field("default_len", &self.default_len)
            .finish()
    }
}

impl DataRegion {
    /// Create a lazily allocated region using the heap allocator.
    pub fn new(default_len: usize) -> Self {
        Self::with_allocator(default_len, Box::new(HeapAllocator))
    }

    pub fn with_allocator(default_len: usize, allocator: Box<dyn RegionAllocator>) -> Self {
        let default_len = if default_len == 0 {
            BufferConfig::DEFAULT_DATA_LEN
        } else {
            default_len
        };
        Self {
            state: RegionState::Unallocated,
            default_len,
            capacity: 0,
            allocator,
        }
    }

    /// Current capacity in bytes; `0` before the first allocation.
    pub fn capacity(&self) -> usize {
        match self.state {
            RegionState::Ready(_) => self.capacity,
            _ => 0,
        }
    }

    pub fn default_len(&self) -> usize {
        self.default_len
    }

    /// Make sure the region holds at least `required` bytes.
    ///
    /// Returns `true` when a new region was allocated, in which case any
    /// previous contents are gone.
    pub fn ensure_capacity(&mut self, required: usize) -> Result<bool> {
        if matches!(self.state, RegionState::Lost) {
            return Err(BridgeError::BufferUnavailable);
        }
        if matches!(self.state, RegionState::Unallocated) {
            let region = self.allocate_or_lose(self.default_len)?;
            self.capacity = self.default_len;
            self.state = RegionState::Ready(region);
            if self.capacity >= required {
                return Ok(true);
            }
        } else if self.capacity >= required {
            return Ok(false);
        }

        let mut next = self.capacity;
        while next < required {
            next = next
                .checked_mul(2)
                .ok_or(BridgeError::Allocation { requested: required })?;
        }

        if let RegionState::Ready(old) = std::mem::replace(&mut self.state, RegionState::Lost) {
            self.allocator.release(old);
        }
        debug!(
            "Growing data region from {} to {} bytes (required {})",
            self.capacity, next, required
        );
        let region = self.allocate_or_lose(next)?;
        self.capacity = next;
        self.state = RegionState::Ready(region);
        Ok(true)
    }

    fn allocate_or_lose(&mut self, len: usize) -> Result<Box<[u8]>> {
        self.allocator.allocate(len).map_err(|e| {
            error!("Data region allocation of {} bytes failed: {}", len, e);
            self.state = RegionState::Lost;
            e
        })
    }

    pub fn as_slice(&self) -> Result<&[u8]> {
        match &self.state {
            RegionState::Ready(region) => Ok(&region[..]),
            RegionState::Unallocated => Ok(Default::default()),
            RegionState::Lost => Err(BridgeError::BufferUnavailable),
        }
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        match &mut self.state {
            RegionState::Ready(region) => Ok(&mut region[..]),
            RegionState::Unallocated => Ok(Default::default()),
            RegionState::Lost => Err(BridgeError::BufferUnavailable),
        }
    }
}

impl Drop for DataRegion {
    fn drop(&mut self) {
        if let RegionState::Ready(region) =
            std::mem::replace(&mut self.state, RegionState::Unallocated)
        {
            self.allocator.release(region);
        }
    }
}
