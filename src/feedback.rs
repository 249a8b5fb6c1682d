//! Best-effort side channel from actions to an external observer.
//!
//! The channel never buffers: [`Feedback::send`] hands a message to a
//! receiver that is already waiting in [`Feedback::recv`] and reports
//! `false` when nobody is listening. Closing wakes every pending receiver
//! with `None`.

use crate::context::Context;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Message carried by the feedback channel.
pub type FeedbackMessage = Box<dyn Any + Send>;

#[derive(Default)]
struct Mailbox {
    waiters: VecDeque<oneshot::Sender<FeedbackMessage>>,
    closed: bool,
}

/// Non-blocking mailbox shared by a machine and its observers.
///
/// # Example
///
/// ```rust
/// use fsm_dispatch::{Context, Feedback};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let feedback = Feedback::new();
///
/// // Nobody is listening yet: the message is dropped.
/// assert!(!feedback.send("lost"));
///
/// let listener = {
///     let feedback = feedback.clone();
///     tokio::spawn(async move { feedback.wait_string(&Context::background()).await })
/// };
/// while !feedback.send("hello".to_string()) {
///     tokio::task::yield_now().await;
/// }
/// assert_eq!(listener.await.unwrap().as_deref(), Some("hello"));
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Feedback {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl Feedback {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `msg` to a waiting receiver.
    ///
    /// Returns `false` without blocking if the channel is closed or no
    /// receiver is waiting; the message is dropped in that case.
    pub fn send<T: Any + Send>(&self, msg: T) -> bool {
        let mut mailbox = self.lock();
        if mailbox.closed {
            return false;
        }

        let mut msg: FeedbackMessage = Box::new(msg);
        while let Some(waiter) = mailbox.waiters.pop_front() {
            match waiter.send(msg) {
                Ok(()) => return true,
                // The receiver gave up; try the next one.
                Err(returned) => msg = returned,
            }
        }
        false
    }

    /// Wait for the next message. `None` once the channel is closed.
    pub async fn recv(&self) -> Option<FeedbackMessage> {
        let rx = {
            let mut mailbox = self.lock();
            if mailbox.closed {
                return None;
            }
            // Drop receivers that gave up before a message arrived.
            mailbox.waiters.retain(|waiter| !waiter.is_closed());
            let (tx, rx) = oneshot::channel();
            mailbox.waiters.push_back(tx);
            rx
        };
        rx.await.ok()
    }

    /// Close the channel, waking pending receivers.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut mailbox = self.lock();
        if mailbox.closed {
            return false;
        }
        mailbox.closed = true;
        mailbox.waiters.clear();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Wait for one message of type `T`.
    ///
    /// Resolves to `None` if `ctx` is cancelled first, the channel closes,
    /// or the next message has a different type.
    pub async fn wait_for<T: Any + Send>(&self, ctx: &Context) -> Option<T> {
        if ctx.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = ctx.cancelled() => None,
            msg = self.recv() => msg.and_then(|msg| msg.downcast::<T>().ok()).map(|msg| *msg),
        }
    }

    /// Wait for one text message, accepting `String` and `&'static str`.
    pub async fn wait_string(&self, ctx: &Context) -> Option<String> {
        if ctx.is_cancelled() {
            return None;
        }
        let msg = tokio::select! {
            _ = ctx.cancelled() => return None,
            msg = self.recv() => msg?,
        };
        match msg.downcast::<String>() {
            Ok(text) => Some(*text),
            Err(msg) => msg
                .downcast::<&'static str>()
                .ok()
                .map(|text| (*text).to_string()),
        }
    }
}

impl fmt::Debug for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mailbox = self.lock();
        f.debug_struct("Feedback")
            .field(
                "waiting",
                &mailbox.waiters.iter().filter(|waiter| !waiter.is_closed()).count(),
            )
            .field("closed", &mailbox.closed)
            .finish()
    }
}
