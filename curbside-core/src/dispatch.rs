//! Completion dispatch for callback-style callers.
//!
//! Network calls run on the tokio runtime; their completions are queued and
//! delivered on whichever thread drains the dispatcher, so a UI loop can
//! keep all callbacks on its own context. Each completion runs exactly once.
//! There is no cancellation: dropping the dispatcher simply means queued
//! completions are never delivered.

use std::future::Future;
use std::sync::Mutex;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type Completion = Box<dyn FnOnce() + Send>;

/// Bridges async operations to blocking and callback-style call sites.
pub struct Dispatcher {
    handle: Handle,
    sender: UnboundedSender<Completion>,
    receiver: Mutex<UnboundedReceiver<Completion>>,
}

impl Dispatcher {
    /// Create a dispatcher that spawns work on the given runtime handle.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            handle,
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Run the future off the caller's context and queue `on_done` with its
    /// output. The completion fires exactly once, on the thread that next
    /// drains [`Dispatcher::run_pending`].
    pub fn submit<T, F, C>(&self, future: F, on_done: C)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let sender = self.sender.clone();
        self.handle.spawn(async move {
            let output = future.await;
            if sender.send(Box::new(move || on_done(output))).is_err() {
                // Nobody is draining anymore; the completion is ignored.
                tracing::debug!("completion dropped, dispatcher closed");
            }
        });
    }

    /// Deliver all queued completions on the calling thread. Returns how
    /// many ran.
    pub fn run_pending(&self) -> usize {
        let Ok(mut receiver) = self.receiver.lock() else {
            return 0;
        };
        let mut delivered = 0;
        while let Ok(completion) = receiver.try_recv() {
            completion();
            delivered += 1;
        }
        delivered
    }

    /// Blocking form: run the future to completion on the runtime and return
    /// its output. Must not be called from inside the runtime's own async
    /// context.
    pub fn call<T, F>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.handle.block_on(future)
    }
}
