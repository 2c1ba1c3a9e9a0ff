use crate::{JobSignal, RunId};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;

struct GroupEntry {
  run: RunId,
  signal: JobSignal,
}

/// Runs that share a concurrency group key. The first entry of a group is
/// the active run; the rest wait behind it in arrival order.
#[derive(Clone)]
pub struct ConcurrencyGroups {
  groups: Arc<Mutex<HashMap<String, Vec<GroupEntry>>>>,
  changed: Arc<watch::Sender<u64>>,
}

/// Held by a run for as long as it occupies its group. Dropping it lets the
/// next run in.
pub struct GroupLease {
  key: String,
  run: RunId,
  groups: ConcurrencyGroups,
}

impl ConcurrencyGroups {
  pub fn new() -> Self {
    let (changed, _) = watch::channel(0);
    ConcurrencyGroups {
      groups: Arc::new(Mutex::new(HashMap::new())),
      changed: Arc::new(changed),
    }
  }

  /// Joins the group and waits until `run` is at its head. With
  /// `cancel_in_progress` every run already in the group is cancelled first.
  /// Also returns early when the run itself is cancelled while waiting.
  pub async fn acquire(
    &self,
    key: impl Into<String>,
    run: RunId,
    signal: JobSignal,
    cancel_in_progress: bool,
  ) -> GroupLease {
    let key = key.into();
    let mut changed = self.changed.subscribe();

    {
      let mut groups = self.groups.lock();
      let entries = groups.entry(key.clone()).or_default();

      if cancel_in_progress {
        for entry in entries.iter() {
          log::info!(
            "Run {} supersedes run {} in concurrency group {}",
            run,
            entry.run,
            key
          );
          if let Err(err) = entry.signal.cancel() {
            log::trace!("Run {} already signalled: {}", entry.run, err);
          }
        }
      }

      entries.push(GroupEntry {
        run: run.clone(),
        signal: signal.clone(),
      });
    }

    loop {
      if self.is_head(&key, &run) {
        log::trace!("Run {} entered concurrency group {}", run, key);
        break;
      }
      if signal.is_cancelled() {
        log::trace!("Run {} was cancelled while waiting for group {}", run, key);
        break;
      }

      log::info!("Run {} is waiting for concurrency group {}", run, key);
      tokio::select! {
        res = changed.changed() => {
          if res.is_err() {
            break;
          }
        }
        _ = signal.recv() => {}
      }
    }

    GroupLease {
      key,
      run,
      groups: self.clone(),
    }
  }

  /// Runs currently holding or waiting for `key`.
  pub fn runs(&self, key: &str) -> Vec<RunId> {
    self
      .groups
      .lock()
      .get(key)
      .map(|entries| entries.iter().map(|entry| entry.run.clone()).collect())
      .unwrap_or_default()
  }

  fn is_head(&self, key: &str, run: &RunId) -> bool {
    self
      .groups
      .lock()
      .get(key)
      .and_then(|entries| entries.first())
      .map(|entry| &entry.run == run)
      .unwrap_or(false)
  }

  fn release(&self, key: &str, run: &RunId) {
    {
      let mut groups = self.groups.lock();
      if let Some(entries) = groups.get_mut(key) {
        entries.retain(|entry| &entry.run != run);
        if entries.is_empty() {
          groups.remove(key);
        }
      }
    }

    self.changed.send_modify(|version| *version = version.wrapping_add(1));
  }
}

impl Default for ConcurrencyGroups {
  fn default() -> Self {
    Self::new()
  }
}

impl GroupLease {
  pub fn key(&self) -> &str {
    &self.key
  }
}

impl Drop for GroupLease {
  fn drop(&mut self) {
    log::trace!("Run {} left concurrency group {}", self.run, self.key);
    self.groups.release(&self.key, &self.run);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[trellis_test::test]
  async fn first_run_enters_immediately() {
    let groups = ConcurrencyGroups::new();

    let lease = groups
      .acquire("deploy", RunId::new("r1"), JobSignal::new(), false)
      .await;

    assert_eq!(lease.key(), "deploy");
    assert_eq!(groups.runs("deploy"), vec![RunId::new("r1")]);

    drop(lease);
    assert!(groups.runs("deploy").is_empty());
  }

  #[trellis_test::test]
  async fn waits_for_previous_run() {
    let groups = ConcurrencyGroups::new();
    let first = groups
      .acquire("deploy", RunId::new("r1"), JobSignal::new(), false)
      .await;

    let waiting = tokio::spawn({
      let groups = groups.clone();
      async move {
        groups
          .acquire("deploy", RunId::new("r2"), JobSignal::new(), false)
          .await
      }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiting.is_finished());
    assert_eq!(groups.runs("deploy").len(), 2);

    drop(first);
    let second = waiting.await.unwrap();
    assert_eq!(groups.runs("deploy"), vec![RunId::new("r2")]);
    drop(second);
  }

  #[trellis_test::test]
  async fn cancel_in_progress() {
    let groups = ConcurrencyGroups::new();
    let first_signal = JobSignal::new();
    let first = groups
      .acquire("deploy", RunId::new("r1"), first_signal.clone(), false)
      .await;

    let waiting = tokio::spawn({
      let groups = groups.clone();
      async move {
        groups
          .acquire("deploy", RunId::new("r2"), JobSignal::new(), true)
          .await
      }
    });

    // The superseded run is told to stop, the new one waits for it to wind down
    first_signal.recv().await;
    assert!(first_signal.is_cancelled());

    drop(first);
    let second = waiting.await.unwrap();
    assert_eq!(second.key(), "deploy");
  }

  #[trellis_test::test]
  async fn groups_are_independent() {
    let groups = ConcurrencyGroups::new();

    let _a = groups
      .acquire("a", RunId::new("r1"), JobSignal::new(), false)
      .await;
    let _b = groups
      .acquire("b", RunId::new("r2"), JobSignal::new(), false)
      .await;

    assert_eq!(groups.runs("a"), vec![RunId::new("r1")]);
    assert_eq!(groups.runs("b"), vec![RunId::new("r2")]);
  }

  #[trellis_test::test]
  async fn cancelled_while_waiting() {
    let groups = ConcurrencyGroups::new();
    let _first = groups
      .acquire("deploy", RunId::new("r1"), JobSignal::new(), false)
      .await;

    let signal = JobSignal::new();
    let waiting = tokio::spawn({
      let groups = groups.clone();
      let signal = signal.clone();
      async move {
        groups
          .acquire("deploy", RunId::new("r2"), signal, false)
          .await
      }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    signal.cancel().unwrap();

    let lease = waiting.await.unwrap();
    drop(lease);
    assert_eq!(groups.runs("deploy"), vec![RunId::new("r1")]);
  }
}
