use super::{Checkin, PoolInner, Slot};
use crate::domain::traits::Manager;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A checked-out resource. Exclusively owned until released or dropped.
///
/// Dropping it checks the resource back in on a spawned task (health probe
/// included); [`super::Pool::release`] does the same inline. If the spawned
/// task never runs, the resource is destroyed and its capacity freed.
pub struct PooledObject<M: Manager> {
    slot: Option<Slot<M::Resource>>,
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> PooledObject<M> {
    pub(super) fn new(slot: Slot<M::Resource>, inner: Arc<PoolInner<M>>) -> Self {
        Self {
            slot: Some(slot),
            inner,
        }
    }

    pub(super) fn take_slot(&mut self) -> Option<Slot<M::Resource>> {
        self.slot.take()
    }

    fn slot(&self) -> &Slot<M::Resource> {
        self.slot
            .as_ref()
            .expect("pooled object accessed after checkin")
    }

    /// Creation sequence number, unique per pool.
    pub fn generation(&self) -> u64 {
        self.slot().generation
    }

}

impl<M: Manager> std::fmt::Debug for PooledObject<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("PooledObject");
        if let Some(slot) = &self.slot {
            debug.field("generation", &slot.generation);
        }
        debug.finish()
    }
}

impl<M: Manager> Deref for PooledObject<M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        &self.slot().resource
    }
}

impl<M: Manager> DerefMut for PooledObject<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .slot
            .as_mut()
            .expect("pooled object accessed after checkin")
            .resource
    }
}

impl<M: Manager> Drop for PooledObject<M> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let checkin = Checkin::new(self.inner.clone(), slot);
                handle.spawn(checkin.run());
            }
            Err(_) => self.inner.checkin_unprobed(slot),
        }
    }
}
