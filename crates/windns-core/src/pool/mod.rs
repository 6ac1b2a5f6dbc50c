//! Connection pool for remote sessions
//!
//! The pool is an explicit value owned by the caller's top-level session
//! object and passed to every engine operation. It opens nothing on
//! construction and closes every idle session on [`ConnectionPool::close`].
//!
//! ## Behaviour
//!
//! - `acquire()` pops the front idle session (FIFO reuse) or opens a new one
//! - `release()` pushes a session back; it never blocks and never validates
//! - No maximum size: each concurrent caller that finds the pool empty opens
//!   its own session
//! - The free-list lock is held only for list mutation, never across the
//!   network I/O of opening a session
//!
//! Idle eviction and liveness probing are opt-in through [`PoolConfig`].

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::Result;
use crate::traits::{Connector, RemoteSession};

/// Counters describing pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions currently idle in the pool
    pub idle: usize,
    /// Sessions opened since the pool was created
    pub opened: u64,
    /// Acquisitions served from the idle list
    pub reused: u64,
    /// Idle sessions closed by eviction or failed probes
    pub evicted: u64,
}

struct IdleSession<S> {
    session: S,
    released_at: DateTime<Utc>,
}

struct PoolInner<C: Connector> {
    connector: C,
    config: PoolConfig,
    idle: Mutex<VecDeque<IdleSession<C::Session>>>,
    closed: AtomicBool,
    opened: AtomicU64,
    reused: AtomicU64,
    evicted: AtomicU64,
}

impl<C: Connector> PoolInner<C> {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleSession<C::Session>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_idle(&self, session: C::Session) {
        if self.closed.load(Ordering::SeqCst) {
            // Release runs from Drop, so the close has to happen on a task
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    debug!("Pool for {} is closed, closing released session", self.connector.target());
                    handle.spawn(session.close());
                }
                Err(_) => warn!(
                    "Pool for {} is closed and no runtime is available, dropping released session",
                    self.connector.target()
                ),
            }
            return;
        }
        self.idle().push_back(IdleSession {
            session,
            released_at: Utc::now(),
        });
    }

    fn is_stale(&self, idle: &IdleSession<C::Session>) -> bool {
        match self.config.max_idle_secs {
            Some(max_idle_secs) => {
                // A limit beyond what chrono can represent never expires
                let Some(limit) = i64::try_from(max_idle_secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                else {
                    return false;
                };
                Utc::now().signed_duration_since(idle.released_at) > limit
            }
            None => false,
        }
    }
}

/// Pool of live sessions to the remote shell host
///
/// Cloning the pool yields another handle to the same free list.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create an empty pool; no session is opened until the first acquire
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                config,
                idle: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
                opened: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
            }),
        }
    }

    /// Check out a session
    ///
    /// # Returns
    ///
    /// - `Ok(PooledSession)`: A session owned exclusively by the caller
    /// - `Err(Error::Connection)`: The pool was empty and a new session could not be opened
    pub async fn acquire(&self) -> Result<PooledSession<C>> {
        loop {
            let popped = self.inner.idle().pop_front();

            let Some(idle) = popped else {
                let session = self.inner.connector.connect().await?;
                self.inner.opened.fetch_add(1, Ordering::SeqCst);
                debug!("Opened new session to {}", self.inner.connector.target());
                return Ok(self.guard(session));
            };

            if self.inner.is_stale(&idle) {
                warn!(
                    "Evicting session to {} idle since {}",
                    self.inner.connector.target(),
                    idle.released_at
                );
                self.inner.evicted.fetch_add(1, Ordering::SeqCst);
                idle.session.close().await;
                continue;
            }

            let mut session = idle.session;
            if self.inner.config.probe_on_acquire && !self.inner.connector.is_alive(&mut session).await {
                warn!(
                    "Evicting dead session to {}",
                    self.inner.connector.target()
                );
                self.inner.evicted.fetch_add(1, Ordering::SeqCst);
                session.close().await;
                continue;
            }

            self.inner.reused.fetch_add(1, Ordering::SeqCst);
            debug!("Reusing pooled session to {}", self.inner.connector.target());
            return Ok(self.guard(session));
        }
    }

    /// Return a session to the pool
    ///
    /// Dropping the guard has the same effect.
    pub fn release(&self, session: PooledSession<C>) {
        drop(session);
    }

    /// Close a checked-out session instead of returning it
    pub async fn discard(&self, mut session: PooledSession<C>) {
        if let Some(session) = session.session.take() {
            session.close().await;
        }
    }

    /// Close every idle session
    ///
    /// Sessions still checked out are closed on a background task when they
    /// are released.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.inner.idle().drain(..).collect();
        let count = drained.len();

        for idle in drained {
            idle.session.close().await;
        }
        info!(
            "Closed {} pooled session(s) to {}",
            count,
            self.inner.connector.target()
        );
    }

    /// Snapshot of pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.inner.idle().len(),
            opened: self.inner.opened.load(Ordering::SeqCst),
            reused: self.inner.reused.load(Ordering::SeqCst),
            evicted: self.inner.evicted.load(Ordering::SeqCst),
        }
    }

    /// The connector this pool opens sessions with
    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    fn guard(&self, session: C::Session) -> PooledSession<C> {
        PooledSession {
            session: Some(session),
            pool: Arc::clone(&self.inner),
        }
    }
}

/// A checked-out session
///
/// Returned to its pool when dropped, so release happens on every exit path.
pub struct PooledSession<C: Connector> {
    // Only `None` after `discard` has consumed the guard.
    session: Option<C::Session>,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> Deref for PooledSession<C> {
    type Target = C::Session;

    fn deref(&self) -> &Self::Target {
        self.session
            .as_ref()
            .expect("pooled session is present until the guard is consumed")
    }
}

impl<C: Connector> DerefMut for PooledSession<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
            .as_mut()
            .expect("pooled session is present until the guard is consumed")
    }
}

impl<C: Connector> Drop for PooledSession<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.push_idle(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CommandOutput;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingSession {
        id: usize,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteSession for CountingSession {
        async fn exec(&mut self, _invocation: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::default())
        }

        async fn close(self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        next_id: AtomicUsize,
        closed: Arc<AtomicUsize>,
        alive: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Session = CountingSession;

        async fn connect(&self) -> Result<CountingSession> {
            Ok(CountingSession {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                closed: Arc::clone(&self.closed),
            })
        }

        async fn is_alive(&self, _session: &mut CountingSession) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn target(&self) -> &str {
            "test-host"
        }
    }

    #[tokio::test]
    async fn test_new_pool_opens_nothing() {
        let pool = ConnectionPool::new(CountingConnector::default(), PoolConfig::default());
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[tokio::test]
    async fn test_sequential_reuse() {
        let pool = ConnectionPool::new(CountingConnector::default(), PoolConfig::default());

        for _ in 0..5 {
            let session = pool.acquire().await.unwrap();
            assert_eq!(session.id, 0);
            pool.release(session);
        }

        let stats = pool.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.reused, 4);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let pool = ConnectionPool::new(CountingConnector::default(), PoolConfig::default());
        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_ne!(first.id, second.id);

        pool.release(second);
        pool.release(first);

        let next = pool.acquire().await.unwrap();
        assert_eq!(next.id, 1, "front of the free list is reused first");
    }

    #[tokio::test]
    async fn test_discard_closes_instead_of_returning() {
        let connector = CountingConnector::default();
        let closed = Arc::clone(&connector.closed);
        let pool = ConnectionPool::new(connector, PoolConfig::default());

        let session = pool.acquire().await.unwrap();
        pool.discard(session).await;

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn test_close_drains_idle_sessions() {
        let connector = CountingConnector::default();
        let closed = Arc::clone(&connector.closed);
        let pool = ConnectionPool::new(connector, PoolConfig::default());

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        pool.release(a);
        pool.release(b);

        pool.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn test_huge_idle_limit_never_evicts() {
        for max_idle_secs in [100_000_000_000_000_000, u64::MAX] {
            let pool = ConnectionPool::new(
                CountingConnector::default(),
                PoolConfig {
                    max_idle_secs: Some(max_idle_secs),
                    probe_on_acquire: false,
                },
            );

            let session = pool.acquire().await.unwrap();
            pool.release(session);

            let session = pool.acquire().await.unwrap();
            assert_eq!(session.id, 0, "limit {} evicted a fresh session", max_idle_secs);
            assert_eq!(pool.stats().evicted, 0);
        }
    }

    #[tokio::test]
    async fn test_release_after_close_closes_session() {
        let connector = CountingConnector::default();
        let closed = Arc::clone(&connector.closed);
        let pool = ConnectionPool::new(connector, PoolConfig::default());

        let session = pool.acquire().await.unwrap();
        pool.close().await;
        pool.release(session);

        for _ in 0..10 {
            if closed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn test_probe_evicts_dead_sessions() {
        let connector = CountingConnector::default();
        let alive = Arc::clone(&connector.alive);
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                max_idle_secs: None,
                probe_on_acquire: true,
            },
        );

        let session = pool.acquire().await.unwrap();
        pool.release(session);

        alive.store(false, Ordering::SeqCst);
        let session = pool.acquire().await.unwrap();
        assert_eq!(session.id, 1, "dead session replaced by a fresh one");
        assert_eq!(pool.stats().evicted, 1);
    }

    #[tokio::test]
    async fn test_default_config_never_probes() {
        let connector = CountingConnector::default();
        let alive = Arc::clone(&connector.alive);
        let pool = ConnectionPool::new(connector, PoolConfig::default());

        let session = pool.acquire().await.unwrap();
        pool.release(session);

        alive.store(false, Ordering::SeqCst);
        let session = pool.acquire().await.unwrap();
        assert_eq!(session.id, 0);
        assert_eq!(pool.stats().evicted, 0);
    }
}
