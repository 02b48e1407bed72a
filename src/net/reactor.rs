//! Fixed pool of I/O reactors.
//!
//! # Responsibilities
//! - Start N threads, each driving its own current-thread Tokio runtime
//! - Spread connection tasks across them in rotation
//! - Stop the threads on shutdown
//!
//! # Design Decisions
//! - A connection lives on exactly one reactor for its whole life, so a
//!   session never migrates between threads mid-exchange
//! - Sockets accepted on the listener's runtime are detached with
//!   `into_std` and re-registered on the target reactor inside the task
//! - Zero reactors means "run on the caller's runtime"

use std::future::Future;
use std::io;
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::pool::RoundRobin;

struct Reactor {
    handle: Handle,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Threads running independent event loops, selected round-robin.
pub struct ReactorPool {
    reactors: Vec<Reactor>,
    selector: RoundRobin,
}

impl ReactorPool {
    pub fn new(size: usize) -> io::Result<Self> {
        let mut reactors = Vec::with_capacity(size);
        for index in 0..size {
            let runtime = Builder::new_current_thread().enable_all().build()?;
            let handle = runtime.handle().clone();
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let thread = std::thread::Builder::new()
                .name(format!("h1-reactor-{}", index))
                .spawn(move || {
                    runtime.block_on(async {
                        let _ = stop_rx.await;
                    });
                    tracing::debug!(reactor = index, "Reactor stopped");
                })?;
            reactors.push(Reactor {
                handle,
                stop: Some(stop_tx),
                thread: Some(thread),
            });
        }
        tracing::info!(reactors = size, "Reactor pool started");
        Ok(Self {
            reactors,
            selector: RoundRobin::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    /// Handle of the next reactor in rotation.
    pub fn next_handle(&self) -> Option<&Handle> {
        self.selector.pick(&self.reactors).map(|r| &r.handle)
    }

    /// Spawn `fut` on the next reactor, or on the current runtime if empty.
    pub fn spawn<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match self.next_handle() {
            Some(handle) => handle.spawn(fut),
            None => tokio::spawn(fut),
        }
    }

    fn signal_stop(&mut self) {
        for reactor in &mut self.reactors {
            if let Some(stop) = reactor.stop.take() {
                let _ = stop.send(());
            }
        }
    }

    /// Stop every reactor and wait for its thread. Blocks the caller.
    pub fn shutdown(mut self) {
        self.signal_stop();
        for reactor in &mut self.reactors {
            if let Some(thread) = reactor.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for ReactorPool {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

impl std::fmt::Debug for ReactorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorPool").field("reactors", &self.reactors.len()).finish()
    }
}
