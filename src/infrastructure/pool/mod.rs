// Bounded pool of reusable resources (HTTP clients, SQLite handles)
//
// Every piece of bookkeeping (idle stack, wait queue, live count, counters)
// sits behind a single mutex that is never held across an await.
mod object;

pub use object::PooledObject;

use crate::domain::error::{PoolError, WithResourceError};
use crate::domain::model::{PoolConfig, PoolStats};
use crate::domain::traits::Manager;
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

pub(crate) struct Slot<R> {
    resource: R,
    created_at: Instant,
    last_used_at: Instant,
    generation: u64,
}

/// What a parked waiter is woken with.
enum Grant<R> {
    /// A healthy resource fresh from checkin.
    Idle(Slot<R>),
    /// A reserved unit of capacity; the waiter creates the resource itself.
    Create,
}

struct Waiter<R> {
    id: u64,
    tx: oneshot::Sender<Grant<R>>,
}

struct State<R> {
    // LIFO: the most recently returned resource is handed out first
    idle: Vec<Slot<R>>,
    waiters: VecDeque<Waiter<R>>,
    live: usize,
    closed: bool,
    next_waiter: u64,
    next_generation: u64,
    created: u64,
    reused: u64,
    recycled: u64,
}

impl<R> State<R> {
    /// Offer a grant to waiters in FIFO order. Waiters whose receiver is gone
    /// are skipped. Returns the grant if nobody took it.
    fn dispatch(&mut self, mut grant: Grant<R>) -> Option<Grant<R>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(grant) {
                Ok(()) => return None,
                Err(back) => grant = back,
            }
        }
        Some(grant)
    }

    /// Give one unit of capacity back: to the next waiter if any, else drop it.
    fn free_capacity(&mut self) {
        if self.closed || self.dispatch(Grant::Create).is_some() {
            self.live -= 1;
        }
    }
}

pub(crate) struct PoolInner<M: Manager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<State<M::Resource>>,
}

impl<M: Manager> PoolInner<M> {
    fn lock(&self) -> MutexGuard<'_, State<M::Resource>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, slot: &Slot<M::Resource>, now: Instant) -> bool {
        now.duration_since(slot.created_at) > self.config.max_age
    }

    fn is_stale(&self, slot: &Slot<M::Resource>, now: Instant) -> bool {
        self.is_expired(slot, now)
            || self
                .config
                .max_idle
                .is_some_and(|max_idle| now.duration_since(slot.last_used_at) > max_idle)
    }

    fn register(&self, resource: M::Resource) -> Slot<M::Resource> {
        let now = Instant::now();
        let mut state = self.lock();
        state.created += 1;
        let generation = state.next_generation;
        state.next_generation += 1;
        Slot {
            resource,
            created_at: now,
            last_used_at: now,
            generation,
        }
    }

    /// Destroy a resource and release its capacity.
    fn discard(&self, slot: Slot<M::Resource>, recycled: bool) {
        {
            let mut state = self.lock();
            if recycled {
                state.recycled += 1;
            }
            state.free_capacity();
        }
        drop(slot);
    }

    /// Final step of every checkin: hand to a waiter or park in the idle stack.
    fn put_back(&self, slot: Slot<M::Resource>) {
        let mut state = self.lock();
        if state.closed {
            state.live -= 1;
            drop(state);
            drop(slot);
            return;
        }
        match state.dispatch(Grant::Idle(slot)) {
            None => state.reused += 1,
            Some(Grant::Idle(slot)) => state.idle.push(slot),
            Some(Grant::Create) => state.live -= 1,
        }
    }

    /// Undo a grant that reached a waiter who is no longer interested.
    fn restore(&self, grant: Grant<M::Resource>) {
        match grant {
            Grant::Idle(slot) => {
                let mut state = self.lock();
                // the hand-off was counted as a reuse that never happened
                state.reused = state.reused.saturating_sub(1);
                drop(state);
                self.put_back(slot);
            }
            Grant::Create => self.lock().free_capacity(),
        }
    }

    /// Checkin without a runtime to run the probe on: age check only.
    fn checkin_unprobed(&self, mut slot: Slot<M::Resource>) {
        let now = Instant::now();
        slot.last_used_at = now;
        if self.is_expired(&slot, now) {
            self.discard(slot, true);
        } else {
            self.put_back(slot);
        }
    }
}

/// A resource on its way back into the pool. Built before any await or
/// spawn, so a checkin that never runs to completion (cancelled release,
/// task dropped by a shutting-down runtime) still frees the capacity.
pub(crate) struct Checkin<M: Manager> {
    inner: Arc<PoolInner<M>>,
    slot: Option<Slot<M::Resource>>,
}

impl<M: Manager> Checkin<M> {
    pub(crate) fn new(inner: Arc<PoolInner<M>>, slot: Slot<M::Resource>) -> Self {
        Self {
            inner,
            slot: Some(slot),
        }
    }

    /// Age check, then health probe, then hand-off.
    pub(crate) async fn run(mut self) {
        let inner = self.inner.clone();
        let Some(slot) = self.slot.as_mut() else {
            return;
        };

        let now = Instant::now();
        slot.last_used_at = now;
        if inner.is_expired(slot, now) {
            debug!(generation = slot.generation, "recycling resource past max age");
            if let Some(slot) = self.slot.take() {
                inner.discard(slot, true);
            }
            return;
        }

        if let Err(e) = inner.manager.check(&mut slot.resource).await {
            let err = PoolError::HealthCheckFailed(e);
            warn!(generation = slot.generation, error = %err, "recycling unhealthy resource");
            if let Some(slot) = self.slot.take() {
                inner.discard(slot, true);
            }
            return;
        }

        if let Some(slot) = self.slot.take() {
            inner.put_back(slot);
        }
    }
}

impl<M: Manager> Drop for Checkin<M> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.inner.discard(slot, false);
        }
    }
}

/// Capacity reserved for a resource that is still being created.
struct Reservation<'a, M: Manager> {
    inner: &'a PoolInner<M>,
    armed: bool,
}

impl<M: Manager> Drop for Reservation<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().free_capacity();
        }
    }
}

/// A caller parked in the wait queue. Dropping it (timeout, cancellation)
/// removes the queue entry or returns whatever was granted in the meantime.
struct PendingWait<'a, M: Manager> {
    inner: &'a PoolInner<M>,
    id: u64,
    rx: oneshot::Receiver<Grant<M::Resource>>,
    done: bool,
}

impl<M: Manager> PendingWait<'_, M> {
    /// Leave the queue. Returns a grant that raced with the departure.
    fn leave(&mut self) -> Option<Grant<M::Resource>> {
        self.done = true;
        {
            let mut state = self.inner.lock();
            if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
                state.waiters.remove(pos);
                return None;
            }
        }
        // Not queued any more: the grant was sent under the lock we just took.
        self.rx.try_recv().ok()
    }
}

impl<M: Manager> Drop for PendingWait<'_, M> {
    fn drop(&mut self) {
        if !self.done {
            if let Some(grant) = self.leave() {
                self.inner.restore(grant);
            }
        }
    }
}

/// Bounded, health-checked pool of resources produced by a [`Manager`].
pub struct Pool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Manager> std::fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

enum Step<R> {
    Ready(Slot<R>),
    Create,
    Wait(u64, oneshot::Receiver<Grant<R>>),
}

impl<M: Manager> Pool<M> {
    pub fn new(manager: M, mut config: PoolConfig) -> Self {
        if config.max_size == 0 {
            debug!("max pool size of 0 raised to 1");
            config.max_size = 1;
        }
        Self {
            inner: Arc::new(PoolInner {
                manager,
                config,
                state: Mutex::new(State {
                    idle: Vec::new(),
                    waiters: VecDeque::new(),
                    live: 0,
                    closed: false,
                    next_waiter: 0,
                    next_generation: 0,
                    created: 0,
                    reused: 0,
                    recycled: 0,
                }),
            }),
        }
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire with the configured `acquire_timeout`.
    pub async fn get(&self) -> Result<PooledObject<M>, PoolError<M::Error>> {
        self.acquire(self.inner.config.acquire_timeout).await
    }

    /// Check out a resource, waiting at most `timeout` when the pool is full.
    pub async fn acquire(
        &self,
        timeout: Duration,
    ) -> Result<PooledObject<M>, PoolError<M::Error>> {
        let mut stale = Vec::new();
        let step = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }

            let now = Instant::now();
            let mut found = None;
            while let Some(slot) = state.idle.pop() {
                if self.inner.is_stale(&slot, now) {
                    state.live -= 1;
                    state.recycled += 1;
                    stale.push(slot);
                    continue;
                }
                state.reused += 1;
                found = Some(slot);
                break;
            }

            if let Some(slot) = found {
                Step::Ready(slot)
            } else if state.live < self.inner.config.max_size {
                state.live += 1;
                Step::Create
            } else {
                let id = state.next_waiter;
                state.next_waiter += 1;
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { id, tx });
                Step::Wait(id, rx)
            }
        };

        if !stale.is_empty() {
            debug!(count = stale.len(), "discarded stale idle resources");
            drop(stale);
        }

        match step {
            Step::Ready(slot) => Ok(PooledObject::new(slot, self.inner.clone())),
            Step::Create => self.create_reserved().await,
            Step::Wait(id, rx) => self.wait(id, rx, timeout).await,
        }
    }

    async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<Grant<M::Resource>>,
        timeout: Duration,
    ) -> Result<PooledObject<M>, PoolError<M::Error>> {
        let mut pending = PendingWait {
            inner: &self.inner,
            id,
            rx,
            done: false,
        };

        let outcome = tokio::time::timeout(timeout, &mut pending.rx).await;
        match outcome {
            Ok(Ok(grant)) => {
                pending.done = true;
                drop(pending);
                self.take_grant(grant).await
            }
            // sender dropped: the pool was closed while we waited
            Ok(Err(_)) => {
                pending.done = true;
                Err(PoolError::Closed)
            }
            Err(_) => match pending.leave() {
                Some(grant) => {
                    drop(pending);
                    self.take_grant(grant).await
                }
                None if self.is_closed() => Err(PoolError::Closed),
                None => {
                    debug!(?timeout, "acquire timed out");
                    Err(PoolError::Timeout(timeout))
                }
            },
        }
    }

    async fn take_grant(
        &self,
        grant: Grant<M::Resource>,
    ) -> Result<PooledObject<M>, PoolError<M::Error>> {
        match grant {
            Grant::Idle(slot) => Ok(PooledObject::new(slot, self.inner.clone())),
            Grant::Create => self.create_reserved().await,
        }
    }

    /// Create a resource for capacity already counted in `live`.
    async fn create_reserved(&self) -> Result<PooledObject<M>, PoolError<M::Error>> {
        let mut reservation = Reservation {
            inner: &self.inner,
            armed: true,
        };
        match self.inner.manager.create().await {
            Ok(resource) => {
                reservation.armed = false;
                let slot = self.inner.register(resource);
                debug!(generation = slot.generation, "created pooled resource");
                Ok(PooledObject::new(slot, self.inner.clone()))
            }
            Err(e) => {
                drop(reservation);
                Err(PoolError::CreationFailed(e))
            }
        }
    }

    /// Return a resource, running the age check and health probe first.
    pub async fn release(&self, mut object: PooledObject<M>) {
        if let Some(slot) = object.take_slot() {
            Checkin::new(self.inner.clone(), slot).run().await;
        }
    }

    /// Run `f` with a checked-out resource, releasing it on every exit path.
    ///
    /// ```ignore
    /// let body = pool
    ///     .with_resource(|conn| Box::pin(async move { conn.get_json("/api/visualizations").await }))
    ///     .await?;
    /// ```
    pub async fn with_resource<F, T, E>(&self, f: F) -> Result<T, WithResourceError<M::Error, E>>
    where
        F: for<'r> FnOnce(&'r mut M::Resource) -> BoxFuture<'r, Result<T, E>>,
    {
        let mut object = self.get().await.map_err(WithResourceError::Pool)?;
        let result = f(&mut *object).await;
        self.release(object).await;
        result.map_err(WithResourceError::Operation)
    }

    /// Pre-create up to `count` idle resources, bounded by the pool size.
    pub async fn warm_up(&self, count: usize) -> Result<usize, PoolError<M::Error>> {
        let mut warmed = 0;
        while warmed < count {
            {
                let mut state = self.inner.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                if state.live >= self.inner.config.max_size {
                    break;
                }
                state.live += 1;
            }
            let mut object = self.create_reserved().await?;
            if let Some(slot) = object.take_slot() {
                self.inner.put_back(slot);
            }
            warmed += 1;
        }
        Ok(warmed)
    }

    /// Shut the pool down. Idle resources are destroyed, waiters fail with
    /// [`PoolError::Closed`], and checked-out resources are destroyed on return.
    pub fn close(&self) -> usize {
        let (idle, waiters) = {
            let mut state = self.inner.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.live -= idle.len();
            (idle, std::mem::take(&mut state.waiters))
        };
        let destroyed = idle.len();
        drop(waiters);
        drop(idle);
        debug!(destroyed, "pool closed");
        destroyed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            created: state.created,
            reused: state.reused,
            recycled: state.recycled,
            active: state.live - state.idle.len(),
            idle: state.idle.len(),
            waiting: state.waiters.len(),
            max_size: self.inner.config.max_size,
        }
    }
}
