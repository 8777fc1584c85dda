//! Sparse registry of live worker handles.

use crate::error::{BridgeError, Result};
use crate::worker::WorkerHandle;
use tracing::{debug, info};

/// Worker handles keyed by a caller-chosen id.
///
/// Backed by a sparse vector: creating id 5 on an empty registry
/// materialises empty slots 0-4. Owned by a single control flow, so there
/// is no internal locking.
#[derive(Debug)]
pub struct WorkerRegistry<W> {
    slots: Vec<Option<W>>,
}

impl<W> Default for WorkerRegistry<W> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<W: WorkerHandle> WorkerRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `id`.
    ///
    /// Fails with [`BridgeError::WorkerExists`] if the slot is live; the
    /// existing handle is left untouched.
    pub fn create(&mut self, id: u32, handle: W) -> Result<()> {
        let index = id as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        let slot = &mut self.slots[index];
        if slot.is_some() {
            return Err(BridgeError::WorkerExists(id));
        }
        *slot = Some(handle);
        debug!("Registered worker {}", id);
        Ok(())
    }

    pub fn contains(&self, id: u32) -> bool {
        matches!(self.slots.get(id as usize), Some(Some(_)))
    }

    pub fn get(&self, id: u32) -> Result<&W> {
        self.slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(BridgeError::WorkerNotFound(id))
    }

    pub fn get_mut(&mut self, id: u32) -> Result<&mut W> {
        self.slots
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(BridgeError::WorkerNotFound(id))
    }

    /// Terminate the worker and clear its slot. An empty slot is an error.
    pub fn terminate(&mut self, id: u32) -> Result<()> {
        let mut handle = self
            .slots
            .get_mut(id as usize)
            .and_then(Option::take)
            .ok_or(BridgeError::WorkerNotFound(id))?;
        handle.terminate()?;
        info!("Terminated worker {}", id);
        Ok(())
    }

    /// Number of slots, live or empty.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Ids of live workers in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::WireMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct FakeWorker {
        name: &'static str,
        terminated: Arc<AtomicUsize>,
    }

    impl WorkerHandle for FakeWorker {
        fn post(&self, _message: WireMessage) -> Result<()> {
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn worker(name: &'static str) -> (FakeWorker, Arc<AtomicUsize>) {
        let terminated = Arc::new(AtomicUsize::new(0));
        (
            FakeWorker {
                name,
                terminated: terminated.clone(),
            },
            terminated,
        )
    }

    #[test]
    fn test_create_then_get() {
        let mut registry = WorkerRegistry::new();
        registry.create(0, worker("a").0).unwrap();
        assert_eq!(registry.get(0).unwrap().name, "a");
        assert!(registry.contains(0));
    }

    #[test]
    fn test_sparse_growth() {
        let mut registry = WorkerRegistry::new();
        registry.create(5, worker("five").0).unwrap();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.live_count(), 1);
        assert!(matches!(registry.get(2), Err(BridgeError::WorkerNotFound(2))));
        assert!(matches!(registry.get(40), Err(BridgeError::WorkerNotFound(40))));

        registry.create(2, worker("two").0).unwrap();
        assert_eq!(registry.ids(), vec![2, 5]);
    }

    #[test]
    fn test_duplicate_create_keeps_existing_handle() {
        let mut registry = WorkerRegistry::new();
        registry.create(1, worker("first").0).unwrap();
        let err = registry.create(1, worker("second").0).unwrap_err();
        assert!(matches!(err, BridgeError::WorkerExists(1)));
        assert!(err.is_fatal());
        assert_eq!(registry.get(1).unwrap().name, "first");
    }

    #[test]
    fn test_terminate_clears_slot() {
        let mut registry = WorkerRegistry::new();
        let (handle, terminated) = worker("a");
        registry.create(3, handle).unwrap();
        registry.terminate(3).unwrap();
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
        assert!(matches!(registry.get(3), Err(BridgeError::WorkerNotFound(3))));
        assert!(matches!(
            registry.terminate(3),
            Err(BridgeError::WorkerNotFound(3))
        ));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_get_mut() {
        let mut registry = WorkerRegistry::new();
        registry.create(0, worker("a").0).unwrap();
        registry.get_mut(0).unwrap().name = "renamed";
        assert_eq!(registry.get(0).unwrap().name, "renamed");
    }
}
