//! Pool of reusable server sessions.
//!
//! # Responsibilities
//! - Hand out an idle session for each accepted connection, or create one
//! - Rebind the session to the current route table on every acquire
//! - Take sessions back once their connection closes
//!
//! # Design Decisions
//! - FIFO queue behind a mutex; the lock is held only to push or pop
//! - Sessions are boxed so a reused session is the same object
//! - Release happens in `Drop` of [`PooledSession`], so a session returns
//!   even if the connection task is cancelled
//! - The idle queue is capped; surplus sessions are simply dropped

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::http::session::{Session, SessionSettings};
use crate::net::connection::ConnectionId;
use crate::net::transport::Transport;
use crate::observability::metrics;
use crate::routing::Router;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub idle: usize,
}

/// Reusable [`Session`] objects.
#[derive(Debug)]
pub struct SessionPool {
    idle: Mutex<VecDeque<Box<Session>>>,
    max_idle: usize,
    settings: Arc<SessionSettings>,
    created: AtomicU64,
    reused: AtomicU64,
}

impl SessionPool {
    pub fn new(settings: Arc<SessionSettings>, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(VecDeque::new()),
            max_idle,
            settings,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        })
    }

    fn idle_queue(&self) -> MutexGuard<'_, VecDeque<Box<Session>>> {
        // a panic while holding the lock can't leave the queue inconsistent
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind `transport` to an idle session (or a new one) and `router`.
    pub fn acquire(
        self: &Arc<Self>,
        transport: Transport,
        router: Arc<Router>,
        connection: Option<ConnectionId>,
    ) -> PooledSession {
        let recycled = self.idle_queue().pop_front();
        let mut session = match recycled {
            Some(session) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                metrics::record_session(true);
                session
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                metrics::record_session(false);
                Box::new(Session::new(
                    Arc::clone(&self.settings),
                    Arc::clone(&router),
                    Arc::downgrade(self),
                ))
            }
        };
        session.attach(transport, router, connection);
        tracing::trace!(session_id = session.id(), "Session acquired");
        PooledSession { session: Some(session) }
    }

    /// Return a session. Its transport, if still attached, is dropped.
    pub fn release(&self, mut session: Box<Session>) {
        drop(session.detach());
        let mut idle = self.idle_queue();
        if idle.len() < self.max_idle {
            tracing::trace!(session_id = session.id(), idle = idle.len() + 1, "Session returned to pool");
            idle.push_back(session);
        } else {
            tracing::trace!(session_id = session.id(), "Idle pool full, dropping session");
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle_queue().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            idle: self.idle_count(),
        }
    }
}

/// A session on loan from a [`SessionPool`]. Returns itself when dropped.
#[derive(Debug)]
pub struct PooledSession {
    session: Option<Box<Session>>,
}

impl Deref for PooledSession {
    type Target = Session;
    fn deref(&self) -> &Session {
        // only `None` after drop
        self.session.as_deref().unwrap_or_else(|| unreachable!("session taken before drop"))
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("session taken before drop"))
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(pool) = session.pool().upgrade() {
                pool.release(session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::SessionState;
    use crate::net::transport::BufferStream;

    fn buffer() -> Transport {
        Transport::Buffer(BufferStream::new(Vec::new()))
    }

    #[test]
    fn released_session_is_reused() {
        let pool = SessionPool::new(Arc::new(SessionSettings::default()), 8);
        let router = Arc::new(Router::new());

        let first = pool.acquire(buffer(), router.clone(), None);
        let first_id = first.id();
        let first_addr = &*first as *const Session;
        drop(first);
        assert_eq!(pool.idle_count(), 1);

        let second = pool.acquire(buffer(), router, None);
        assert_eq!(second.id(), first_id);
        assert_eq!(&*second as *const Session, first_addr);
        assert!(second.has_transport());
        assert_eq!(pool.stats(), PoolStats { created: 1, reused: 1, idle: 0 });
    }

    #[test]
    fn idle_sessions_have_no_transport() {
        let pool = SessionPool::new(Arc::new(SessionSettings::default()), 8);
        let s = pool.acquire(buffer(), Arc::new(Router::new()), None);
        drop(s);
        let idle = pool.idle_queue();
        let session = idle.front().unwrap();
        assert!(!session.has_transport());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn idle_queue_is_capped() {
        let pool = SessionPool::new(Arc::new(SessionSettings::default()), 1);
        let router = Arc::new(Router::new());
        let a = pool.acquire(buffer(), router.clone(), None);
        let b = pool.acquire(buffer(), router, None);
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.stats().created, 2);
    }

    #[tokio::test]
    async fn concurrent_connections_get_distinct_sessions() {
        let pool = SessionPool::new(Arc::new(SessionSettings::default()), 8);
        let router = Arc::new(Router::new());
        let a = pool.acquire(buffer(), router.clone(), None);
        let b = pool.acquire(buffer(), router, None);
        assert_ne!(a.id(), b.id());
    }
}
