//! # Connection Pool
//!
//! Keyed reuse of stateful remote sessions.
//!
//! ## Overview
//!
//! A [`ConnectionPool`] keeps at most one connection per realm (scheme,
//! host, port and credentials of an address). [`acquire`](ConnectionPool::acquire)
//! returns a [`PooledConnection`] guard that owns the realm's lock: only one
//! caller uses a given connection at a time, and dropping the guard releases
//! it on every exit path, `?` early returns and panics included.
//!
//! ```text
//! acquire(url) ──▶ realm slot ──▶ lock ──▶ check_connection()
//!                                            │ ok      │ failed
//!                                            ▼         ▼
//!                                          reuse    close + connect
//! ```
//!
//! Validation failure triggers exactly one transparent reconnect. A failed
//! connect is returned to the caller and never retried here.
//!
//! # Thread Safety
//!
//! Locks are `parking_lot` mutexes; the per-realm lock is an `Arc` lock so
//! the guard does not borrow the pool. Different realms never wait on each
//! other. A caller that was waiting on a slot evicted in the meantime looks
//! the realm up again instead of reviving the detached slot.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::{FileUrl, FsResult, PoolConfig};

/// A pooled remote session.
pub trait ConnectionHandler: Send + 'static {
    /// Cheap liveness probe, run on every acquire.
    fn check_connection(&mut self) -> bool;

    /// Close the session. Called when the connection is discarded or evicted.
    fn close(&mut self) {}
}

/// Opens new connections for a realm.
pub trait ConnectionFactory<C>: Send + Sync {
    /// Connect to `realm`.
    ///
    /// # Errors
    ///
    /// - [`FsError::Authentication`](crate::FsError::Authentication) if the credentials are rejected
    /// - [`FsError::Io`](crate::FsError::Io) or [`FsError::Backend`](crate::FsError::Backend) on transport failure
    fn connect(&self, realm: &FileUrl) -> FsResult<C>;
}

impl<C, F> ConnectionFactory<C> for F
where
    F: Fn(&FileUrl) -> FsResult<C> + Send + Sync,
{
    fn connect(&self, realm: &FileUrl) -> FsResult<C> {
        self(realm)
    }
}

struct Slot<C> {
    connection: C,
    last_used: Instant,
    /// The next acquire must reconnect.
    broken: bool,
    /// `connection.close()` already ran.
    closed: bool,
    /// Removed from the pool; waiters must look the realm up again.
    evicted: bool,
}

impl<C> Slot<C> {
    fn new(connection: C) -> Self {
        Self {
            connection,
            last_used: Instant::now(),
            broken: false,
            closed: false,
            evicted: false,
        }
    }
}

type SlotRef<C> = Arc<Mutex<Slot<C>>>;

type SlotGuard<C> = ArcMutexGuard<RawMutex, Slot<C>>;

/// Per-realm pool of connections.
pub struct ConnectionPool<C> {
    factory: Box<dyn ConnectionFactory<C>>,
    keep_alive: Duration,
    slots: Mutex<HashMap<FileUrl, SlotRef<C>>>,
}

impl<C> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("keep_alive", &self.keep_alive)
            .field("realms", &self.slots.lock().len())
            .finish()
    }
}

impl<C: ConnectionHandler> ConnectionPool<C> {
    /// Empty pool opening connections with `factory`.
    pub fn new(factory: impl ConnectionFactory<C> + 'static, config: &PoolConfig) -> Self {
        Self {
            factory: Box::new(factory),
            keep_alive: config.keep_alive,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Lock and return the connection of `url`'s realm, creating it if needed.
    ///
    /// Blocks while another caller holds the same realm.
    ///
    /// # Errors
    ///
    /// Whatever the factory returns when a connection has to be opened. The
    /// realm lock is released before returning.
    pub fn acquire(&self, url: &FileUrl) -> FsResult<PooledConnection<C>> {
        let realm = url.realm();
        loop {
            let slot = match self.lookup(&realm) {
                Some(slot) => slot,
                None => match self.create(&realm)? {
                    Created::Fresh(guard) => return Ok(PooledConnection { guard, realm }),
                    Created::Raced(slot) => slot,
                },
            };
            if let Some(connection) = self.validate(&realm, slot.lock_arc())? {
                return Ok(connection);
            }
            tracing::debug!(realm = %realm, "pooled connection evicted while waiting, looking up again");
        }
    }

    fn lookup(&self, realm: &FileUrl) -> Option<SlotRef<C>> {
        self.slots.lock().get(realm).cloned()
    }

    /// Check a locked slot, reconnecting once if it failed validation.
    ///
    /// Returns `None` if the slot left the pool before the lock was taken.
    fn validate(&self, realm: &FileUrl, mut guard: SlotGuard<C>) -> FsResult<Option<PooledConnection<C>>> {
        if guard.evicted {
            return Ok(None);
        }
        if guard.broken || !guard.connection.check_connection() {
            tracing::warn!(realm = %realm, "pooled connection failed validation, reconnecting");
            if !guard.closed {
                guard.connection.close();
                guard.closed = true;
            }
            guard.broken = true;
            guard.connection = self.factory.connect(realm)?;
            guard.broken = false;
            guard.closed = false;
        } else {
            tracing::debug!(realm = %realm, "reusing pooled connection");
        }
        Ok(Some(PooledConnection {
            guard,
            realm: realm.clone(),
        }))
    }

    /// Run `f` with the connection of `url`'s realm, releasing it afterwards.
    pub fn with_connection<T>(&self, url: &FileUrl, f: impl FnOnce(&mut C) -> FsResult<T>) -> FsResult<T> {
        let mut connection = self.acquire(url)?;
        f(&mut *connection)
    }

    fn create(&self, realm: &FileUrl) -> FsResult<Created<C>> {
        let connection = self.factory.connect(realm)?;
        let slot = Arc::new(Mutex::new(Slot::new(connection)));
        let guard = slot.lock_arc();

        let mut slots = self.slots.lock();
        match slots.entry(realm.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                tracing::debug!(realm = %realm, "created pooled connection");
                Ok(Created::Fresh(guard))
            }
            Entry::Occupied(occupied) => {
                // Another caller connected first; keep theirs.
                let theirs = occupied.get().clone();
                drop(slots);
                let mut ours = guard;
                ours.connection.close();
                Ok(Created::Raced(theirs))
            }
        }
    }

    /// Close and forget connections idle for longer than the keep-alive.
    ///
    /// Connections currently held are skipped. Returns how many were closed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|realm, slot| {
            let Some(mut guard) = slot.try_lock() else {
                return true;
            };
            if guard.broken || now.saturating_duration_since(guard.last_used) >= self.keep_alive {
                if !guard.closed {
                    guard.connection.close();
                    guard.closed = true;
                }
                guard.broken = true;
                guard.evicted = true;
                tracing::debug!(realm = %realm, "evicted idle connection");
                false
            } else {
                true
            }
        });
        before - slots.len()
    }

    /// Number of realms with a pooled connection.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no connection is pooled.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

enum Created<C> {
    Fresh(SlotGuard<C>),
    Raced(SlotRef<C>),
}

/// Exclusive use of a pooled connection; released on drop.
pub struct PooledConnection<C> {
    guard: SlotGuard<C>,
    realm: FileUrl,
}

impl<C> PooledConnection<C> {
    /// Realm the connection belongs to.
    pub fn realm(&self) -> &FileUrl {
        &self.realm
    }

    /// Mark the connection unusable; the next acquire reconnects.
    pub fn invalidate(&mut self) {
        self.guard.broken = true;
    }

    /// Release the connection. Same as dropping the guard.
    pub fn release(self) {}
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard.connection
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard.connection
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        self.guard.last_used = Instant::now();
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("realm", &self.realm)
            .field("broken", &self.guard.broken)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FsError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Session {
        id: usize,
        alive: Arc<AtomicBool>,
        closed: Arc<AtomicUsize>,
    }

    impl ConnectionHandler for Session {
        fn check_connection(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        pool: ConnectionPool<Session>,
        created: Arc<AtomicUsize>,
        alive: Arc<AtomicBool>,
        closed: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    fn fixture(keep_alive: Duration) -> Fixture {
        let created = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        let factory = {
            let (created, alive, closed, fail) = (created.clone(), alive.clone(), closed.clone(), fail.clone());
            move |realm: &FileUrl| {
                if fail.load(Ordering::SeqCst) {
                    return Err(FsError::Authentication { url: realm.clone() });
                }
                alive.store(true, Ordering::SeqCst);
                Ok(Session {
                    id: created.fetch_add(1, Ordering::SeqCst),
                    alive: alive.clone(),
                    closed: closed.clone(),
                })
            }
        };
        Fixture {
            pool: ConnectionPool::new(factory, &PoolConfig { keep_alive }),
            created,
            alive,
            closed,
            fail,
        }
    }

    fn url(path: &str) -> FileUrl {
        FileUrl::parse(&format!("vsphere://user:pw@host{path}")).unwrap()
    }

    #[test]
    fn sequential_cycles_reuse_the_handle() {
        let f = fixture(Duration::from_secs(300));
        let first = f.pool.acquire(&url("/vm/a")).unwrap().id;
        let second = f.pool.acquire(&url("/vm/b/c")).unwrap().id;
        assert_eq!(first, second);
        assert_eq!(f.created.load(Ordering::SeqCst), 1);
        assert_eq!(f.pool.len(), 1);
    }

    #[test]
    fn realms_get_distinct_handles() {
        let f = fixture(Duration::from_secs(300));
        let a = f.pool.acquire(&url("/x")).unwrap().id;
        let other = FileUrl::parse("vsphere://user:pw@other/x").unwrap();
        let b = f.pool.acquire(&other).unwrap().id;
        assert_ne!(a, b);
        assert_eq!(f.pool.len(), 2);
    }

    #[test]
    fn failed_validation_reconnects_once() {
        let f = fixture(Duration::from_secs(300));
        let first = f.pool.acquire(&url("/")).unwrap().id;
        f.alive.store(false, Ordering::SeqCst);
        let second = f.pool.acquire(&url("/")).unwrap().id;
        assert_ne!(first, second);
        assert_eq!(f.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidated_handle_is_replaced() {
        let f = fixture(Duration::from_secs(300));
        let mut connection = f.pool.acquire(&url("/")).unwrap();
        let first = connection.id;
        connection.invalidate();
        connection.release();
        assert_ne!(f.pool.acquire(&url("/")).unwrap().id, first);
    }

    #[test]
    fn connect_failure_surfaces_and_releases() {
        let f = fixture(Duration::from_secs(300));
        f.pool.acquire(&url("/")).unwrap();
        f.alive.store(false, Ordering::SeqCst);
        f.fail.store(true, Ordering::SeqCst);
        assert!(matches!(f.pool.acquire(&url("/")), Err(FsError::Authentication { .. })));

        // The realm lock was released: the next acquire proceeds and reconnects.
        f.fail.store(false, Ordering::SeqCst);
        assert_eq!(f.pool.acquire(&url("/")).unwrap().id, 1);
    }

    #[test]
    fn error_inside_scope_still_releases() {
        let f = fixture(Duration::from_secs(300));
        let result: FsResult<()> = f
            .pool
            .with_connection(&url("/"), |_| Err(FsError::Backend("boom".into())));
        assert!(result.is_err());
        assert_eq!(f.pool.with_connection(&url("/"), |s| Ok(s.id)).unwrap(), 0);
    }

    #[test]
    fn holders_are_mutually_exclusive() {
        let f = Arc::new(fixture(Duration::from_secs(300)));
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (f, active, overlap) = (f.clone(), active.clone(), overlap.clone());
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let _connection = f.pool.acquire(&url("/")).unwrap();
                        if active.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlap.store(true, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!overlap.load(Ordering::SeqCst));
        assert_eq!(f.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idle_connections_are_evicted() {
        let f = fixture(Duration::ZERO);
        f.pool.acquire(&url("/")).unwrap();
        let held = f.pool.acquire(&FileUrl::parse("vsphere://user:pw@busy/").unwrap()).unwrap();

        assert_eq!(f.pool.evict_idle(), 1);
        assert_eq!(f.pool.len(), 1);
        assert_eq!(f.closed.load(Ordering::SeqCst), 1);
        drop(held);
        assert!(!f.pool.is_empty());
    }

    #[test]
    fn eviction_between_lookup_and_lock_is_retried() {
        let f = fixture(Duration::ZERO);
        let realm = url("/").realm();
        f.pool.acquire(&realm).unwrap();

        let stale = f.pool.lookup(&realm).unwrap();
        assert_eq!(f.pool.evict_idle(), 1);
        assert!(f.pool.validate(&realm, stale.lock_arc()).unwrap().is_none());
        assert_eq!(f.created.load(Ordering::SeqCst), 1);

        let connection = f.pool.acquire(&realm).unwrap();
        assert_eq!(connection.id, 1);
        drop(connection);
        assert_eq!(f.pool.len(), 1);
        assert!(!Arc::ptr_eq(&stale, &f.pool.lookup(&realm).unwrap()));
        assert_eq!(f.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiter_on_evicted_slot_lands_in_the_pool() {
        let f = Arc::new(fixture(Duration::ZERO));
        let mut held = f.pool.acquire(&url("/")).unwrap();

        let waiter = {
            let f = f.clone();
            std::thread::spawn(move || f.pool.acquire(&url("/")).map(|c| c.id))
        };
        // Let the waiter block on the held slot, then detach it the way
        // eviction does before releasing.
        std::thread::sleep(Duration::from_millis(50));
        held.guard.connection.close();
        held.guard.closed = true;
        held.guard.evicted = true;
        f.pool.slots.lock().remove(&url("/").realm());
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), 1);
        assert_eq!(f.pool.len(), 1);
        assert_eq!(f.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_reconnect_closes_the_old_session_once() {
        let f = fixture(Duration::from_secs(300));
        f.pool.acquire(&url("/")).unwrap();
        f.alive.store(false, Ordering::SeqCst);
        f.fail.store(true, Ordering::SeqCst);
        assert!(f.pool.acquire(&url("/")).is_err());
        assert!(f.pool.acquire(&url("/")).is_err());
        assert_eq!(f.closed.load(Ordering::SeqCst), 1);

        f.fail.store(false, Ordering::SeqCst);
        assert_eq!(f.pool.acquire(&url("/")).unwrap().id, 1);
        assert_eq!(f.closed.load(Ordering::SeqCst), 1);
        assert_eq!(f.pool.evict_idle(), 0);
    }

    #[test]
    fn evicting_a_broken_slot_skips_the_second_close() {
        let f = fixture(Duration::from_secs(300));
        f.pool.acquire(&url("/")).unwrap();
        f.alive.store(false, Ordering::SeqCst);
        f.fail.store(true, Ordering::SeqCst);
        assert!(f.pool.acquire(&url("/")).is_err());

        assert_eq!(f.pool.evict_idle(), 1);
        assert_eq!(f.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pool_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConnectionPool<Session>>();
    }
}
