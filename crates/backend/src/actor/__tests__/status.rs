//! StatusActor behavior: flicker suppression, counters, completion text.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use super::helpers::ProbeSink;
use crate::actor::{Handle, Icon, Scheduler, StatusActor, message::StatusMsg, spawn};

const WINDOW: Duration = Duration::from_millis(100);

struct Rig {
  scheduler: Arc<Scheduler>,
  status: Handle<StatusMsg>,
  sink: Arc<ProbeSink>,
}

fn rig() -> Rig {
  let scheduler = Scheduler::new();
  let sink = Arc::new(ProbeSink::default());
  let (status_h, rx) = Handle::channel(&scheduler);
  let actor = StatusActor::new(sink.clone(), WINDOW, status_h.clone());
  spawn(actor, rx, scheduler.clone(), CancellationToken::new());
  Rig {
    scheduler,
    status: status_h,
    sink,
  }
}

#[tokio::test(start_paused = true)]
async fn test_first_update_applies_immediately() {
  let rig = rig();

  rig.status.send(StatusMsg::Syncing).unwrap();
  rig.scheduler.quiesce().await;

  assert_eq!(rig.sink.icons(), vec![Icon::BlueTick, Icon::BlueSync]);
}

#[tokio::test(start_paused = true)]
async fn test_updates_within_the_window_are_collapsed() {
  let rig = rig();

  rig.status.send(StatusMsg::Syncing).unwrap();
  rig
    .status
    .send(StatusMsg::Error {
      tooltip: "transient".into(),
    })
    .unwrap();
  rig.status.send(StatusMsg::Done).unwrap();

  tokio::time::sleep(Duration::from_millis(250)).await;
  rig.scheduler.quiesce().await;

  // The transient error inside the window is never shown.
  assert_eq!(
    rig.sink.icons(),
    vec![Icon::BlueTick, Icon::BlueSync, Icon::GreenTick]
  );
}

#[tokio::test(start_paused = true)]
async fn test_done_reports_and_resets_the_counters() {
  let rig = rig();

  rig
    .status
    .send(StatusMsg::FileTotals {
      total: 2,
      example: PathBuf::from("src/a.rs"),
    })
    .unwrap();
  rig
    .status
    .send(StatusMsg::FilesAndBytes { files: 0, bytes: 17 })
    .unwrap();
  rig.status.send(StatusMsg::Done).unwrap();
  tokio::time::sleep(Duration::from_millis(150)).await;

  rig.status.send(StatusMsg::Done).unwrap();
  tokio::time::sleep(Duration::from_millis(150)).await;
  rig.scheduler.quiesce().await;

  let tooltips = rig.sink.tooltips();
  let first_done = tooltips
    .iter()
    .find(|t| t.starts_with("Syncing Complete"))
    .expect("completion tooltip");
  assert!(first_done.contains("2 files 17 bytes"));

  // The second completion starts from zeroed counters.
  let last_done = tooltips
    .iter()
    .rev()
    .find(|t| t.starts_with("Syncing Complete"))
    .expect("second completion tooltip");
  assert!(last_done.contains("0 files 0 bytes"));
}

#[tokio::test(start_paused = true)]
async fn test_file_totals_shape_the_syncing_tooltip() {
  let rig = rig();

  rig
    .status
    .send(StatusMsg::FileTotals {
      total: 3,
      example: PathBuf::from("src/lib.rs"),
    })
    .unwrap();
  rig.status.send(StatusMsg::Syncing).unwrap();
  rig.scheduler.quiesce().await;

  let tooltips = rig.sink.tooltips();
  assert!(
    tooltips
      .iter()
      .any(|t| t.contains("Syncing 3 files") && t.contains("src/lib.rs"))
  );
}
