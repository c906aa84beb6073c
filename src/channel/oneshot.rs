//! Single-use settlement channel.
//!
//! A oneshot channel carries exactly one value from the scheduler's dispatch
//! path to a task handle. Sending never blocks; receiving is non-blocking
//! (`try_recv`) or waker-driven (`Receiver` implements `Future`).

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Error returned when receiving fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The sender was dropped without sending a value.
    Closed,
}

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("receiving on a closed oneshot channel")
    }
}

impl std::error::Error for RecvError {}

/// Error returned when `try_recv` finds no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No value yet, but the sender still exists.
    Empty,
    /// The sender was dropped without sending a value.
    Closed,
}

impl std::fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("oneshot channel is empty"),
            Self::Closed => f.write_str("oneshot channel is closed"),
        }
    }
}

impl std::error::Error for TryRecvError {}

#[derive(Debug)]
struct Inner<T> {
    value: Option<T>,
    sender_dropped: bool,
    waker: Option<Waker>,
}

/// Creates a oneshot channel.
#[must_use]
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Mutex::new(Inner {
        value: None,
        sender_dropped: false,
        waker: None,
    }));
    (
        Sender {
            inner: Arc::clone(&inner),
        },
        Receiver { inner },
    )
}

/// The sending half. Consumed by `send`.
#[derive(Debug)]
pub struct Sender<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Sender<T> {
    /// Sends the value, waking the receiver if it is waiting.
    ///
    /// Returns the value back if the receiver is gone.
    pub fn send(self, value: T) -> Result<(), T> {
        let waker = {
            let mut inner = self.inner.lock();
            if Arc::strong_count(&self.inner) == 1 {
                // Receiver dropped; nothing will ever read the value.
                return Err(value);
            }
            inner.value = Some(value);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let waker = {
            let mut inner = self.inner.lock();
            inner.sender_dropped = true;
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// The receiving half.
#[derive(Debug)]
pub struct Receiver<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Receiver<T> {
    /// Returns true if a value is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.lock().value.is_some()
    }

    /// Returns true if the sender is gone and no value will arrive.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let inner = self.inner.lock();
        inner.sender_dropped && inner.value.is_none()
    }

    /// Takes the value if one has been sent.
    ///
    /// # Errors
    ///
    /// `Empty` while the sender is alive, `Closed` once it is gone.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.value.take() {
            return Ok(value);
        }
        if inner.sender_dropped {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }
}

impl<T> Future for Receiver<T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.value.take() {
            return Poll::Ready(Ok(value));
        }
        if inner.sender_dropped {
            return Poll::Ready(Err(RecvError::Closed));
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_try_recv() {
        let (tx, rx) = channel();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        tx.send(5).unwrap();
        assert!(rx.is_ready());
        assert_eq!(rx.try_recv(), Ok(5));
        // A value is delivered at most once.
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn dropped_sender_closes_channel() {
        let (tx, rx) = channel::<u32>();
        drop(tx);
        assert!(rx.is_closed());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn send_to_dropped_receiver_returns_value() {
        let (tx, rx) = channel();
        drop(rx);
        assert_eq!(tx.send(9), Err(9));
    }

    #[test]
    fn future_resolves_once_sent() {
        let (tx, rx) = channel();
        tx.send("done").unwrap();
        assert_eq!(futures_lite::future::block_on(rx), Ok("done"));
    }

    #[test]
    fn future_resolves_closed_when_sender_drops() {
        let (tx, rx) = channel::<()>();
        drop(tx);
        assert_eq!(futures_lite::future::block_on(rx), Err(RecvError::Closed));
    }
}
