//! Panic containment for backend futures, keeping the panic message and the
//! stack captured at the panic site.
//!
//! A process-wide hook is installed once. It only records a backtrace when
//! the panicking thread is inside [`CatchPanic`]'s poll; every other panic is
//! forwarded to the previously installed hook unchanged.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

pub(crate) fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let stack = Backtrace::force_capture().to_string();
                LAST_STACK.with(|s| *s.borrow_mut() = Some(stack));
            } else {
                previous(info);
            }
        }));
    });
}

/// A panic raised while polling a backend future.
#[derive(Debug)]
pub(crate) struct BackendPanic {
    pub(crate) message: String,
    pub(crate) stack: String,
}

/// Wraps a boxed future so that a panic during `poll` resolves to
/// `Err(BackendPanic)` instead of unwinding into the runtime.
pub(crate) struct CatchPanic<F: ?Sized> {
    inner: Pin<Box<F>>,
}

impl<F: Future + ?Sized> CatchPanic<F> {
    pub(crate) fn new(inner: Pin<Box<F>>) -> Self {
        install_hook();
        Self { inner }
    }
}

impl<F: Future + ?Sized> Future for CatchPanic<F> {
    type Output = Result<F::Output, BackendPanic>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        let was_capturing = CAPTURING.with(|c| c.replace(true));
        let polled = panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx)));
        CAPTURING.with(|c| c.set(was_capturing));

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(out)) => Poll::Ready(Ok(out)),
            Err(payload) => {
                let stack = LAST_STACK
                    .with(|s| s.borrow_mut().take())
                    .unwrap_or_else(|| "<no stack captured>".to_string());
                Poll::Ready(Err(BackendPanic {
                    message: panic_message(payload),
                    stack,
                }))
            }
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
