//! DebounceActor behavior: coalescing, stale triggers, lockfile noise.

use std::{
  collections::HashSet,
  path::PathBuf,
  sync::{Arc, Mutex},
  time::Duration,
};

use tokio_util::sync::CancellationToken;

use super::helpers::spawn_collector;
use crate::actor::{
  DebounceActor, Handle, Scheduler, spawn,
  message::{DebounceMsg, SkipMsg},
};

const WINDOW: Duration = Duration::from_millis(100);

struct Rig {
  scheduler: Arc<Scheduler>,
  debounce: Handle<DebounceMsg>,
  downstream: Arc<Mutex<Vec<SkipMsg>>>,
}

fn rig() -> Rig {
  let scheduler = Scheduler::new();
  let cancel = CancellationToken::new();
  let (skip_h, downstream) = spawn_collector::<SkipMsg>(&scheduler, cancel.child_token());
  let (debounce_h, rx) = Handle::channel(&scheduler);
  let actor = DebounceActor::new(WINDOW, skip_h, debounce_h.clone());
  spawn(actor, rx, scheduler.clone(), cancel);
  Rig {
    scheduler,
    debounce: debounce_h,
    downstream,
  }
}

fn paths(values: &[&str]) -> HashSet<PathBuf> {
  values.iter().map(PathBuf::from).collect()
}

fn batches(store: &Mutex<Vec<SkipMsg>>) -> Vec<HashSet<PathBuf>> {
  store
    .lock()
    .unwrap()
    .iter()
    .map(|msg| match msg {
      SkipMsg::Paths(p) => p.clone(),
      other => panic!("unexpected downstream message: {other:?}"),
    })
    .collect()
}

#[tokio::test(start_paused = true)]
async fn test_event_storm_produces_one_batch() {
  let rig = rig();

  for _ in 0..1000 {
    rig.debounce.send(DebounceMsg::Paths(paths(&["/src/f"]))).unwrap();
  }

  tokio::time::sleep(Duration::from_millis(150)).await;
  rig.scheduler.quiesce().await;

  let flushed = batches(&rig.downstream);
  assert_eq!(flushed.len(), 1);
  assert_eq!(flushed[0], paths(&["/src/f"]));
}

#[tokio::test(start_paused = true)]
async fn test_growing_burst_extends_the_quiet_window() {
  let rig = rig();

  rig.debounce.send(DebounceMsg::Paths(paths(&["/src/a"]))).unwrap();
  tokio::time::sleep(Duration::from_millis(60)).await;
  rig.debounce.send(DebounceMsg::Paths(paths(&["/src/b"]))).unwrap();

  // The first trigger fires now but its count token is stale.
  tokio::time::sleep(Duration::from_millis(60)).await;
  assert!(batches(&rig.downstream).is_empty());

  // The re-armed trigger flushes the combined batch.
  tokio::time::sleep(Duration::from_millis(50)).await;
  rig.scheduler.quiesce().await;

  let flushed = batches(&rig.downstream);
  assert_eq!(flushed.len(), 1);
  assert_eq!(flushed[0], paths(&["/src/a", "/src/b"]));
}

#[tokio::test(start_paused = true)]
async fn test_lockfile_only_bursts_never_wake_the_pipeline() {
  let rig = rig();

  rig
    .debounce
    .send(DebounceMsg::Paths(paths(&["/src/.git/index.lock"])))
    .unwrap();
  tokio::time::sleep(Duration::from_millis(200)).await;
  rig.scheduler.quiesce().await;

  assert!(batches(&rig.downstream).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_mixed_burst_keeps_the_lockfile_path() {
  let rig = rig();

  rig
    .debounce
    .send(DebounceMsg::Paths(paths(&["/src/.git/index.lock", "/src/real.txt"])))
    .unwrap();
  tokio::time::sleep(Duration::from_millis(150)).await;
  rig.scheduler.quiesce().await;

  let flushed = batches(&rig.downstream);
  assert_eq!(flushed.len(), 1);
  assert!(flushed[0].contains(&PathBuf::from("/src/real.txt")));
}
