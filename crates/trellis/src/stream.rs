use crate::{Log, Outputs, RunResult};
use parking_lot::Mutex;
use std::{
  collections::VecDeque,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll, Waker},
};
use tokio_stream::Stream;

#[derive(Default)]
struct SharedState {
  logs: VecDeque<Log>,
  outputs: Outputs,
  result: Option<RunResult>,
  waker: Option<Waker>,
}

impl SharedState {
  fn wake(&mut self) {
    if let Some(waker) = self.waker.take() {
      waker.wake();
    }
  }
}

/// Log stream handed back by a [`Runner`](crate::Runner). Ends once the
/// sender has reported a result and every buffered log has been read.
pub struct StreamReceiver {
  state: Arc<Mutex<SharedState>>,
}

impl StreamReceiver {
  pub fn result(&self) -> Option<RunResult> {
    self.state.lock().result.clone()
  }

  /// Outputs set by the step so far.
  pub fn outputs(&self) -> Outputs {
    self.state.lock().outputs.clone()
  }
}

impl Stream for StreamReceiver {
  type Item = Log;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let mut state = self.state.lock();

    if let Some(log) = state.logs.pop_front() {
      return Poll::Ready(Some(log));
    }

    if state.result.is_some() {
      return Poll::Ready(None);
    }

    state.waker = Some(cx.waker().clone());
    Poll::Pending
  }
}

#[derive(Clone)]
pub struct StreamSender {
  state: Arc<Mutex<SharedState>>,
}

impl StreamSender {
  pub fn log(&self, message: impl Into<String>) {
    self.push(Log::log(message));
  }

  pub fn error(&self, message: impl Into<String>) {
    self.push(Log::error(message));
  }

  /// Sets a step output, readable by later steps as
  /// `steps.<id>.outputs.<key>`.
  pub fn output(&self, key: impl Into<String>, value: impl Into<String>) {
    self.state.lock().outputs.insert(key.into(), value.into());
  }

  pub fn succeeded(&self) {
    self.end(RunResult::Succeeded)
  }

  pub fn cancelled(&self) {
    self.end(RunResult::Cancelled)
  }

  pub fn failed(&self, exit_code: i32) {
    self.end(RunResult::Failed { exit_code })
  }

  /// Only the first result is kept.
  pub fn end(&self, result: RunResult) {
    let mut state = self.state.lock();
    if state.result.is_none() {
      state.result = Some(result);
    }
    state.wake();
  }

  pub fn is_ended(&self) -> bool {
    self.state.lock().result.is_some()
  }

  fn push(&self, log: Log) {
    let mut state = self.state.lock();
    state.logs.push_back(log);
    state.wake();
  }
}

pub fn stream() -> (StreamSender, StreamReceiver) {
  let state = Arc::new(Mutex::new(SharedState::default()));

  (
    StreamSender {
      state: state.clone(),
    },
    StreamReceiver { state },
  )
}
