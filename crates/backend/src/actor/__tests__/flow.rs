//! End-to-end flows through the full ensemble: bootstrap merge, event
//! cycles, ignore rules, and cross-root ordering.

use std::{collections::HashSet, time::Duration};

use super::helpers::{AgentBehavior, ScriptedLauncher, StartPlan, TestRig, wait_for};
use crate::actor::{Icon, message::DebounceMsg};
use tether_core::{MapEntry, Mapping, Signature};
use tether_proto::Rpc;

const WAIT: Duration = Duration::from_secs(5);

fn single_mapping(root: &std::path::Path) -> Mapping {
  Mapping::new(vec![MapEntry {
    local_root: root.to_path_buf(),
    remote_root: "work".to_string(),
  }])
  .unwrap()
}

fn position<F: Fn(&Rpc) -> bool>(rpcs: &[Rpc], pred: F) -> Option<usize> {
  rpcs.iter().position(pred)
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_creates_the_file_remotely() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("a.txt"), b"twelve bytes").unwrap();

  let behavior = AgentBehavior::new();
  let launcher = ScriptedLauncher::new(vec![StartPlan::Agent(behavior.clone())]);
  let rig = TestRig::start(single_mapping(dir.path()), "", launcher);

  assert!(
    wait_for(WAIT, || {
      let rpcs = behavior.received();
      rpcs.iter().filter(|r| matches!(r, Rpc::Complete)).count() >= 2
    })
    .await
  );

  let rpcs = behavior.received();
  let scan = position(&rpcs, |r| matches!(r, Rpc::FullScan { .. })).expect("scan request");
  let prepare = position(
    &rpcs,
    |r| matches!(r, Rpc::PrepareFile { path, total_blocks, .. } if path == "work/a.txt" && *total_blocks == 1),
  )
  .expect("prepare");
  let chunk = position(&rpcs, |r| {
    matches!(
      r,
      Rpc::WriteChunk { dest, sub_path, offset, data }
        if dest == "work" && sub_path == "a.txt" && *offset == 0 && data == b"twelve bytes"
    )
  })
  .expect("chunk");
  let barrier = rpcs.iter().rposition(|r| matches!(r, Rpc::Complete)).unwrap();

  assert!(scan < prepare);
  assert!(prepare < chunk);
  assert!(chunk < barrier);

  // The tray ends on the done icon after showing the sync icon.
  assert!(
    wait_for(WAIT, || {
      let icons = rig.sink.icons();
      icons.contains(&Icon::BlueSync) && icons.last() == Some(&Icon::GreenTick)
    })
    .await
  );
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_deletes_paths_that_exist_only_remotely() {
  let dir = tempfile::tempdir().unwrap();

  let behavior = AgentBehavior::new().with_scan(vec![(
    "work".to_string(),
    "stale.txt".to_string(),
    Signature::File {
      perm: 0o644,
      block_hashes: vec![[3; 16]],
      size: 9,
    },
  )]);
  let launcher = ScriptedLauncher::new(vec![StartPlan::Agent(behavior.clone())]);
  let _rig = TestRig::start(single_mapping(dir.path()), "", launcher);

  assert!(
    wait_for(WAIT, || {
      behavior
        .received()
        .iter()
        .any(|r| matches!(r, Rpc::Delete { path } if path == "work/stale.txt"))
    })
    .await
  );
}

#[tokio::test(start_paused = true)]
async fn test_edit_flows_from_raw_event_to_chunk_write() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("note.md");
  std::fs::write(&file, b"v1").unwrap();

  let behavior = AgentBehavior::new();
  let launcher = ScriptedLauncher::new(vec![StartPlan::Agent(behavior.clone())]);
  let rig = TestRig::start(single_mapping(dir.path()), "", launcher);

  // Wait out the bootstrap cycle first.
  assert!(
    wait_for(WAIT, || {
      behavior
        .received()
        .iter()
        .any(|r| matches!(r, Rpc::WriteChunk { data, .. } if data == b"v1"))
    })
    .await
  );

  std::fs::write(&file, b"v2 edited").unwrap();
  rig
    .debounce
    .send(DebounceMsg::Paths(HashSet::from([file.clone()])))
    .unwrap();

  assert!(
    wait_for(WAIT, || {
      behavior
        .received()
        .iter()
        .any(|r| matches!(r, Rpc::WriteChunk { data, .. } if data == b"v2 edited"))
    })
    .await
  );
}

#[tokio::test(start_paused = true)]
async fn test_ignored_paths_never_reach_the_agent() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::create_dir(dir.path().join("target")).unwrap();
  std::fs::write(dir.path().join("kept.txt"), b"kept").unwrap();
  std::fs::write(dir.path().join("target/junk.bin"), b"junk").unwrap();

  let behavior = AgentBehavior::new();
  let launcher = ScriptedLauncher::new(vec![StartPlan::Agent(behavior.clone())]);
  let rig = TestRig::start(single_mapping(dir.path()), "target/", launcher);

  assert!(
    wait_for(WAIT, || {
      behavior
        .received()
        .iter()
        .any(|r| matches!(r, Rpc::PrepareFile { path, .. } if path == "work/kept.txt"))
    })
    .await
  );

  // An event inside the ignored tree produces an empty cycle.
  rig
    .debounce
    .send(DebounceMsg::Paths(HashSet::from([dir.path().join("target/junk.bin")])))
    .unwrap();
  tokio::time::sleep(Duration::from_millis(200)).await;
  rig.scheduler.quiesce().await;

  assert!(
    !behavior
      .received()
      .iter()
      .any(|r| format!("{r:?}").contains("target")),
    "no operation may reference the ignored tree"
  );
}

#[tokio::test(start_paused = true)]
async fn test_two_roots_sync_in_mapping_order() {
  let dir_a = tempfile::tempdir().unwrap();
  let dir_b = tempfile::tempdir().unwrap();
  std::fs::create_dir(dir_a.path().join("sub")).unwrap();
  std::fs::write(dir_a.path().join("sub/one.txt"), b"one").unwrap();
  std::fs::write(dir_b.path().join("two.txt"), b"two").unwrap();

  let mapping = Mapping::new(vec![
    MapEntry {
      local_root: dir_a.path().to_path_buf(),
      remote_root: "x".to_string(),
    },
    MapEntry {
      local_root: dir_b.path().to_path_buf(),
      remote_root: "y".to_string(),
    },
  ])
  .unwrap();

  let behavior = AgentBehavior::new();
  let launcher = ScriptedLauncher::new(vec![StartPlan::Agent(behavior.clone())]);
  let _rig = TestRig::start(mapping, "", launcher);

  assert!(
    wait_for(WAIT, || {
      behavior
        .received()
        .iter()
        .any(|r| matches!(r, Rpc::WriteChunk { dest, .. } if dest == "y"))
    })
    .await
  );

  let rpcs = behavior.received();
  let last_x = rpcs
    .iter()
    .rposition(|r| format!("{r:?}").contains("\"x/") || matches!(r, Rpc::WriteChunk { dest, .. } if dest == "x"))
    .unwrap();
  let first_y = rpcs
    .iter()
    .position(|r| format!("{r:?}").contains("\"y/") || matches!(r, Rpc::WriteChunk { dest, .. } if dest == "y"))
    .unwrap();
  assert!(last_x < first_y, "all x operations must precede all y operations");

  // Within the first root, the directory exists before the file write.
  let mkdir = position(&rpcs, |r| matches!(r, Rpc::MkDir { path, .. } if path == "x/sub")).expect("mkdir");
  let prepare = position(&rpcs, |r| matches!(r, Rpc::PrepareFile { path, .. } if path == "x/sub/one.txt"))
    .expect("prepare under new dir");
  assert!(mkdir < prepare);
}
