//! # Attribute Cache
//!
//! TTL-based metadata snapshots for remote-backed entities.
//!
//! ## Overview
//!
//! [`SyncedAttributes`] holds the last [`FileAttributes`] fetched from an
//! [`AttributeSource`] and an expiration instant. Reading through
//! [`get_or_refresh`](SyncedAttributes::get_or_refresh) fetches a new
//! snapshot first when the current one has expired, so a read may block on
//! I/O; [`snapshot`](SyncedAttributes::snapshot) never does.
//!
//! | Situation | Refreshes |
//! |-----------|-----------|
//! | Two reads within the TTL | exactly one (or none if built with a snapshot) |
//! | A read after expiry | exactly one, before returning |
//! | Backend answers "not found" | one successful refresh recording `exists == false` |
//!
//! ## Failure Policy
//!
//! | [`RefreshPolicy`] | A failed refresh |
//! |-------------------|------------------|
//! | `KeepStale` | logs a warning, keeps the previous snapshot, restarts the TTL |
//! | `Propagate` | returns the error, the snapshot stays expired |
//!
//! Authentication failures are always returned.
//!
//! # Thread Safety
//!
//! The snapshot sits behind a `parking_lot::Mutex` held for the whole
//! refresh, so refreshes on one instance are sequential and a snapshot is
//! replaced whole, never partially.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{CacheConfig, FileAttributes, FsError, FsResult};

/// Fetches fresh attributes from a backend.
pub trait AttributeSource: Send + Sync {
    /// Fetch the current attributes.
    ///
    /// A missing entity may be reported either as `Ok` with
    /// `exists == false` or as [`FsError::NotFound`]; both are recorded as a
    /// successful refresh.
    fn fetch(&self) -> FsResult<FileAttributes>;
}

impl<F> AttributeSource for F
where
    F: Fn() -> FsResult<FileAttributes> + Send + Sync,
{
    fn fetch(&self) -> FsResult<FileAttributes> {
        self()
    }
}

/// What a failed refresh does to the cached snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RefreshPolicy {
    /// Keep serving the previous snapshot until the next expiry.
    #[default]
    KeepStale,
    /// Return the error to the caller.
    Propagate,
}

#[derive(Debug)]
struct State {
    snapshot: FileAttributes,
    expires: Option<Instant>,
}

/// Cached attributes with a time-to-live.
#[derive(Debug)]
pub struct SyncedAttributes<S> {
    source: S,
    ttl: Duration,
    policy: RefreshPolicy,
    state: Mutex<State>,
}

impl<S: AttributeSource> SyncedAttributes<S> {
    /// Cache with no snapshot yet; the first read refreshes.
    pub fn new(source: S, config: &CacheConfig) -> Self {
        Self {
            source,
            ttl: config.attribute_ttl,
            policy: config.refresh_policy,
            state: Mutex::new(State {
                snapshot: FileAttributes::missing(),
                expires: None,
            }),
        }
    }

    /// Cache holding a known-fresh snapshot (from an enumeration response);
    /// the TTL starts now and no fetch is made.
    pub fn with_snapshot(source: S, snapshot: FileAttributes, config: &CacheConfig) -> Self {
        let cache = Self::new(source, config);
        *cache.state.lock() = State {
            snapshot,
            expires: Some(Instant::now() + cache.ttl),
        };
        cache
    }

    /// The snapshot, refreshed first if it has expired.
    ///
    /// May block on I/O.
    pub fn get_or_refresh(&self) -> FsResult<FileAttributes> {
        let mut state = self.state.lock();
        if Self::is_expired(&state) {
            self.refresh_locked(&mut state)?;
        }
        Ok(state.snapshot.clone())
    }

    /// Fetch a new snapshot now, whatever the expiration.
    pub fn refresh(&self) -> FsResult<FileAttributes> {
        let mut state = self.state.lock();
        self.refresh_locked(&mut state)?;
        Ok(state.snapshot.clone())
    }

    /// The current snapshot, without refreshing.
    pub fn snapshot(&self) -> FileAttributes {
        self.state.lock().snapshot.clone()
    }

    /// Replace the snapshot after a successful local mutation (rename,
    /// date change...) and restart the TTL.
    pub fn update(&self, f: impl FnOnce(&mut FileAttributes)) {
        let mut state = self.state.lock();
        f(&mut state.snapshot);
        state.expires = Some(Instant::now() + self.ttl);
    }

    /// Expire the snapshot; the next read refreshes.
    pub fn invalidate(&self) {
        self.state.lock().expires = None;
    }

    /// Returns `true` if the next read will refresh.
    pub fn is_stale(&self) -> bool {
        Self::is_expired(&self.state.lock())
    }

    /// The attribute source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn is_expired(state: &State) -> bool {
        state.expires.is_none_or(|expires| Instant::now() > expires)
    }

    fn refresh_locked(&self, state: &mut State) -> FsResult<()> {
        let fetched = match self.source.fetch() {
            Ok(attributes) => Ok(attributes),
            Err(FsError::NotFound { .. }) => Ok(FileAttributes::missing()),
            Err(error) => Err(error),
        };

        match fetched {
            Ok(attributes) => {
                state.snapshot = attributes;
                state.expires = Some(Instant::now() + self.ttl);
                Ok(())
            }
            Err(error @ FsError::Authentication { .. }) => Err(error),
            Err(error) => match self.policy {
                RefreshPolicy::KeepStale => {
                    tracing::warn!(%error, "attribute refresh failed, keeping stale snapshot");
                    state.expires = Some(Instant::now() + self.ttl);
                    Ok(())
                }
                RefreshPolicy::Propagate => Err(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileUrl;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    /// Source counting fetches and answering from a script.
    struct Scripted {
        calls: Arc<AtomicUsize>,
        answer: fn(usize) -> FsResult<FileAttributes>,
    }

    impl AttributeSource for Scripted {
        fn fetch(&self) -> FsResult<FileAttributes> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)(n)
        }
    }

    fn config(ttl: Duration, refresh_policy: RefreshPolicy) -> CacheConfig {
        CacheConfig {
            attribute_ttl: ttl,
            refresh_policy,
        }
    }

    fn cache(
        ttl: Duration,
        policy: RefreshPolicy,
        answer: fn(usize) -> FsResult<FileAttributes>,
    ) -> (SyncedAttributes<Scripted>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Scripted {
            calls: calls.clone(),
            answer,
        };
        (SyncedAttributes::new(source, &config(ttl, policy)), calls)
    }

    fn sized(n: usize) -> FsResult<FileAttributes> {
        Ok(FileAttributes::file(n as u64, SystemTime::UNIX_EPOCH))
    }

    #[test]
    fn two_reads_within_ttl_refresh_once() {
        let (cache, calls) = cache(Duration::from_secs(60), RefreshPolicy::KeepStale, sized);
        assert_eq!(cache.get_or_refresh().unwrap().size, 0);
        assert_eq!(cache.get_or_refresh().unwrap().size, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_after_expiry_refreshes_once() {
        let (cache, calls) = cache(Duration::from_millis(20), RefreshPolicy::KeepStale, sized);
        cache.get_or_refresh().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.is_stale());
        assert_eq!(cache.get_or_refresh().unwrap().size, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn known_snapshot_skips_first_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Scripted {
            calls: calls.clone(),
            answer: sized,
        };
        let cache = SyncedAttributes::with_snapshot(
            source,
            FileAttributes::file(99, SystemTime::UNIX_EPOCH),
            &config(Duration::from_secs(60), RefreshPolicy::KeepStale),
        );
        assert_eq!(cache.get_or_refresh().unwrap().size, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn not_found_is_a_successful_refresh() {
        let (cache, calls) = cache(Duration::from_secs(60), RefreshPolicy::Propagate, |_| {
            Err(FsError::NotFound {
                url: FileUrl::new("s3", "h", "/gone"),
            })
        });
        let attributes = cache.get_or_refresh().unwrap();
        assert!(!attributes.exists);
        cache.get_or_refresh().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn keep_stale_serves_previous_snapshot() {
        let (cache, calls) = cache(Duration::from_secs(60), RefreshPolicy::KeepStale, |n| {
            if n == 0 {
                sized(5)
            } else {
                Err(FsError::Backend("timeout".into()))
            }
        });
        cache.get_or_refresh().unwrap();
        assert_eq!(cache.refresh().unwrap().size, 5);
        assert!(!cache.is_stale());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn propagate_returns_error_and_stays_expired() {
        let (cache, _) = cache(Duration::from_secs(60), RefreshPolicy::Propagate, |_| {
            Err(FsError::Backend("down".into()))
        });
        assert!(matches!(cache.get_or_refresh(), Err(FsError::Backend(_))));
        assert!(cache.is_stale());
    }

    #[test]
    fn authentication_failure_is_never_swallowed() {
        let (cache, _) = cache(Duration::from_secs(60), RefreshPolicy::KeepStale, |_| {
            Err(FsError::Authentication {
                url: FileUrl::new("s3", "h", "/"),
            })
        });
        assert!(matches!(cache.get_or_refresh(), Err(FsError::Authentication { .. })));
    }

    #[test]
    fn invalidate_and_update() {
        let (cache, calls) = cache(Duration::from_secs(60), RefreshPolicy::KeepStale, sized);
        cache.get_or_refresh().unwrap();
        cache.invalidate();
        assert!(cache.is_stale());
        cache.get_or_refresh().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.update(|a| a.size = 1234);
        assert_eq!(cache.snapshot().size, 1234);
        assert_eq!(cache.get_or_refresh().unwrap().size, 1234);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closures_are_sources() {
        let cache = SyncedAttributes::new(
            || -> FsResult<FileAttributes> { Ok(FileAttributes::directory(SystemTime::UNIX_EPOCH)) },
            &CacheConfig::default(),
        );
        assert!(cache.get_or_refresh().unwrap().directory);
    }
}
