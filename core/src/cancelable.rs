//! Single-assignment async result with explicit cancellation.
//!
//! # Design
//! A `CancelableFuture` is a small state machine:
//!
//! ```text
//! Pending ──resolve──▶ Resolved
//!    │ ────reject───▶ Rejected
//!    └─────cancel───▶ Cancelled
//! ```
//!
//! The first transition out of `Pending` wins and later ones are ignored.
//! Cancellation hooks run only on `Pending -> Cancelled`, outside the state
//! lock, each exactly once. A panicking hook is logged and does not stop the
//! remaining hooks or the cancellation rejection.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{CancelError, RequestError};

type CancelHook = Box<dyn FnOnce() + Send>;

/// Lifecycle phase of a [`CancelableFuture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

struct State<T> {
    phase: Phase,
    outcome: Option<Result<T, RequestError>>,
    hooks: Vec<CancelHook>,
    waker: Option<Waker>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::Pending,
                outcome: None,
                hooks: Vec::new(),
                waker: None,
            }),
        }
    }

    fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    fn settle(&self, outcome: Result<T, RequestError>) -> bool {
        let (hooks, waker) = {
            let mut state = self.state.lock();
            if state.phase != Phase::Pending {
                return false;
            }
            state.phase = if outcome.is_ok() {
                Phase::Resolved
            } else {
                Phase::Rejected
            };
            state.outcome = Some(outcome);
            (std::mem::take(&mut state.hooks), state.waker.take())
        };
        drop(hooks);
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn cancel(&self) -> bool {
        let (hooks, waker) = {
            let mut state = self.state.lock();
            if state.phase != Phase::Pending {
                return false;
            }
            state.phase = Phase::Cancelled;
            state.outcome = Some(Err(CancelError::default().into()));
            (std::mem::take(&mut state.hooks), state.waker.take())
        };

        for hook in hooks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(hook)) {
                warn!("Cancellation hook failed: {}", panic_message(panic.as_ref()));
            }
        }

        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn register(&self, hook: CancelHook) {
        let mut state = self.state.lock();
        if state.phase == Phase::Pending {
            state.hooks.push(hook);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Producer side: settles the future. Calls after the first settlement, or
/// after cancellation, are ignored and return `false`.
pub struct Settle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Settle<T> {
    pub fn resolve(&self, value: T) -> bool {
        self.shared.settle(Ok(value))
    }

    pub fn reject(&self, error: impl Into<RequestError>) -> bool {
        self.shared.settle(Err(error.into()))
    }

    pub fn settle(&self, outcome: Result<T, RequestError>) -> bool {
        self.shared.settle(outcome)
    }
}

/// Producer side: registers cleanup to run if the future is cancelled while
/// pending. Hooks registered after settlement are dropped unrun.
pub struct OnCancel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for OnCancel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> OnCancel<T> {
    pub fn register(&self, hook: impl FnOnce() + Send + 'static) {
        self.shared.register(Box::new(hook));
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.phase() == Phase::Resolved
    }

    pub fn is_rejected(&self) -> bool {
        self.shared.phase() == Phase::Rejected
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.phase() == Phase::Cancelled
    }
}

/// Cancel-only handle, usable while the future itself is being awaited.
pub struct CancelHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CancelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> CancelHandle<T> {
    /// Returns `true` if this call moved the future to `Cancelled`.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.phase() == Phase::Cancelled
    }
}

/// Awaitable result of an in-flight operation that can be cancelled.
pub struct CancelableFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> CancelableFuture<T> {
    /// Run `executor` immediately with the settle and cancel-registration
    /// handles.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Settle<T>, OnCancel<T>),
    {
        let shared = Arc::new(Shared::new());
        executor(
            Settle {
                shared: Arc::clone(&shared),
            },
            OnCancel {
                shared: Arc::clone(&shared),
            },
        );
        Self { shared }
    }

    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    pub fn cancel_handle(&self) -> CancelHandle<T> {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn is_resolved(&self) -> bool {
        self.phase() == Phase::Resolved
    }

    pub fn is_rejected(&self) -> bool {
        self.phase() == Phase::Rejected
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase() == Phase::Cancelled
    }
}

impl<T: Send + 'static> CancelableFuture<T> {
    /// Drive `future` on the Tokio runtime. Cancelling aborts the task, which
    /// drops whatever I/O it was waiting on.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    {
        Self::new(|settle, on_cancel| {
            let task = tokio::spawn(async move {
                settle.settle(future.await);
            });
            on_cancel.register(move || task.abort());
        })
    }
}

impl<T> Future for CancelableFuture<T> {
    type Output = Result<T, RequestError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock();
        if let Some(outcome) = state.outcome.take() {
            return Poll::Ready(outcome);
        }
        if state.phase != Phase::Pending {
            panic!("CancelableFuture polled after completion");
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
