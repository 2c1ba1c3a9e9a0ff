use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
  future::Future,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll, Waker},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
  Cancel,
  Timeout,
}

#[derive(Debug, Default)]
struct SignalState {
  signal: Option<Signal>,
  wakers: Vec<Waker>,
}

/// One-shot cancel/timeout flag shared between the scheduler, a job's
/// executor and the runner of its current step. Any number of clones may
/// wait on it at once.
#[derive(Clone, Debug, Default)]
pub struct JobSignal {
  state: Arc<Mutex<SignalState>>,
}

pub struct Receiver<'a> {
  signal: &'a JobSignal,
}

impl JobSignal {
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolves once the signal is raised. Resolves immediately if it already was.
  pub fn recv(&self) -> Receiver<'_> {
    Receiver { signal: self }
  }

  /// Resolves once the signal is raised as a timeout. Never resolves if it
  /// was raised as a cancel.
  pub async fn timed_out(&self) {
    if self.recv().await != Signal::Timeout {
      std::future::pending::<()>().await;
    }
  }

  pub fn cancel(&self) -> Result<()> {
    self.raise(Signal::Cancel)
  }

  pub fn timeout(&self) -> Result<()> {
    self.raise(Signal::Timeout)
  }

  pub fn signal(&self) -> Option<Signal> {
    self.state.lock().signal
  }

  pub fn is_cancelled(&self) -> bool {
    self.signal() == Some(Signal::Cancel)
  }

  pub fn is_timeout(&self) -> bool {
    self.signal() == Some(Signal::Timeout)
  }

  fn raise(&self, signal: Signal) -> Result<()> {
    let wakers = {
      let mut state = self.state.lock();
      if let Some(existing) = state.signal {
        return Err(Error::error(format!("Signal has already been raised: {}", existing)));
      }

      state.signal = Some(signal);
      std::mem::take(&mut state.wakers)
    };

    for waker in wakers {
      waker.wake();
    }

    Ok(())
  }
}

impl<'a> Future for Receiver<'a> {
  type Output = Signal;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut state = self.signal.state.lock();

    if let Some(signal) = state.signal {
      return Poll::Ready(signal);
    }

    if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
      state.wakers.push(cx.waker().clone());
    }

    Poll::Pending
  }
}

impl std::fmt::Display for Signal {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Signal::Cancel => write!(f, "cancel"),
      Signal::Timeout => write!(f, "timeout"),
    }
  }
}

impl TryFrom<&str> for Signal {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self> {
    match value {
      "cancel" => Ok(Signal::Cancel),
      "timeout" => Ok(Signal::Timeout),
      _ => Err(Error::error(format!("Invalid signal: {}", value))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn raise_twice() {
    let signal = JobSignal::new();
    assert!(!signal.is_cancelled());
    assert!(!signal.is_timeout());

    signal.cancel().unwrap();
    assert!(signal.is_cancelled());
    assert!(!signal.is_timeout());

    assert_eq!(
      signal.timeout().unwrap_err(),
      Error::error("Signal has already been raised: cancel")
    );
    assert!(signal.is_cancelled());
  }

  #[trellis_test::test]
  async fn wakes_every_receiver() {
    let signal = JobSignal::new();

    let first = tokio::spawn({
      let signal = signal.clone();
      async move { signal.recv().await }
    });
    let second = tokio::spawn({
      let signal = signal.clone();
      async move { signal.recv().await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    signal.timeout().unwrap();

    assert_eq!(first.await.unwrap(), Signal::Timeout);
    assert_eq!(second.await.unwrap(), Signal::Timeout);
  }

  #[trellis_test::test]
  async fn already_raised() {
    let signal = JobSignal::new();
    signal.cancel().unwrap();

    assert_eq!(signal.recv().await, Signal::Cancel);
    assert_eq!(signal.recv().await, Signal::Cancel);
  }

  #[trellis_test::test]
  async fn timed_out_ignores_cancel() {
    let cancelled = JobSignal::new();
    cancelled.cancel().unwrap();
    let waited =
      tokio::time::timeout(Duration::from_millis(20), cancelled.timed_out()).await;
    assert!(waited.is_err());

    let timed_out = JobSignal::new();
    timed_out.timeout().unwrap();
    tokio::time::timeout(Duration::from_millis(20), timed_out.timed_out())
      .await
      .unwrap();
  }

  #[test]
  fn parse_signal() {
    assert_eq!(Signal::try_from("cancel").unwrap(), Signal::Cancel);
    assert_eq!(Signal::try_from("timeout").unwrap(), Signal::Timeout);
    assert!(Signal::try_from("stop").is_err());
    assert_eq!(Signal::Timeout.to_string(), "timeout");
  }
}
