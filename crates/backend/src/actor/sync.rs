//! SyncActor - computes and streams the operations that bring the remote
//! mirror into agreement with the local tree.
//!
//! The actor owns one [`Vfs`] per mapping entry: its model of what the
//! agent's filesystem currently contains. A sync cycle diffs the observed
//! local signatures against the mirror and emits the minimal operation
//! stream; the mirror is updated predictively at emit time, and the agent
//! session's replay buffer (not mirror rollback) covers transport
//! failures.
//!
//! # States
//!
//! - `RemoteScanning`: bootstrap. The local walk and the agent's scan run
//!   in parallel; both path sets accumulate here, and events arriving
//!   early are folded in rather than dropped. Once both finish, every
//!   path seen on either side is diffed in one pass.
//! - `Waiting`: steady state. Each filtered event batch triggers a cycle.

use std::{
  collections::{BTreeSet, HashMap},
  ops::ControlFlow,
  path::PathBuf,
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use tether_core::{BlockHash, MapEntry, Mapping, Signature, Vfs, remote_path};
use tether_proto::Rpc;
use tracing::{debug, info, trace, warn};

use super::{
  Actor, Handle, Scheduler,
  message::{AgentMsg, StatusMsg, SyncMsg, SyncUnit},
};
use crate::fs;

/// Delay before a failed path set is retried.
const RETRY_DELAY: Duration = Duration::from_millis(500);

enum SyncState {
  RemoteScanning {
    local: HashMap<PathBuf, BTreeSet<PathBuf>>,
    remote: HashMap<String, BTreeSet<PathBuf>>,
    vfs: Vec<Vfs<Signature>>,
    scans_complete: u8,
  },
  Waiting {
    vfs: Vec<Vfs<Signature>>,
  },
}

pub struct SyncActor {
  mapping: Arc<Mapping>,
  agent: Handle<AgentMsg>,
  status: Handle<StatusMsg>,
  self_handle: Handle<SyncMsg>,
  scheduler: Arc<Scheduler>,
  state: SyncState,
}

impl SyncActor {
  pub fn new(
    mapping: Arc<Mapping>,
    agent: Handle<AgentMsg>,
    status: Handle<StatusMsg>,
    self_handle: Handle<SyncMsg>,
  ) -> Self {
    let scheduler = self_handle.scheduler().clone();
    let vfs = mapping.entries().iter().map(|_| Vfs::new()).collect();
    Self {
      mapping,
      agent,
      status,
      self_handle,
      scheduler,
      state: SyncState::RemoteScanning {
        local: HashMap::new(),
        remote: HashMap::new(),
        vfs,
        scans_complete: 0,
      },
    }
  }

  /// Diff every path in `paths` and stream the resulting operations to
  /// the agent session, ending with a `Complete` barrier.
  fn execute_sync(&self, paths: &HashMap<PathBuf, BTreeSet<PathBuf>>, vfs: &mut [Vfs<Signature>]) {
    let mut units: Vec<SyncUnit> = Vec::new();
    let mut failed: HashMap<PathBuf, BTreeSet<PathBuf>> = HashMap::new();
    let mut files = 0u64;
    let mut example = None;

    for (idx, entry) in self.mapping.entries().iter().enumerate() {
      let Some(subs) = paths.get(&entry.local_root) else {
        continue;
      };
      if subs.is_empty() {
        continue;
      }

      let plan = plan_entry(entry, subs, &mut vfs[idx]);
      debug!(
        root = %entry.local_root.display(),
        considered = subs.len(),
        ops = plan.units.len(),
        failed = plan.failed.len(),
        "Planned sync cycle for root"
      );

      units.extend(plan.units);
      files += plan.files;
      example = example.or(plan.example);
      if !plan.failed.is_empty() {
        failed.insert(entry.local_root.clone(), plan.failed);
      }
    }

    if !failed.is_empty() {
      warn!(
        roots = failed.len(),
        "Re-enqueueing paths that failed to stat for retry"
      );
      self
        .scheduler
        .schedule(self.self_handle.clone(), SyncMsg::Events(failed), RETRY_DELAY);
    }

    let has_work = !units.is_empty();
    if files > 0 {
      units.insert(
        0,
        SyncUnit::FileTotals {
          total: files,
          example: example.unwrap_or_default(),
        },
      );
    }
    units.push(SyncUnit::Complete);

    if has_work {
      let _ = self.status.send(StatusMsg::Syncing);
    }
    for unit in units {
      let _ = self.agent.send(AgentMsg::Send(unit));
    }
  }
}

#[async_trait]
impl Actor for SyncActor {
  type Msg = SyncMsg;

  fn name(&self) -> &'static str {
    "sync"
  }

  async fn handle(&mut self, msg: SyncMsg) -> ControlFlow<()> {
    let state = std::mem::replace(
      &mut self.state,
      SyncState::Waiting { vfs: Vec::new() },
    );

    self.state = match (state, msg) {
      (
        SyncState::RemoteScanning {
          mut local,
          remote,
          vfs,
          scans_complete,
        },
        SyncMsg::LocalScanned { root, sub, .. },
      ) => {
        trace!(root = %root.display(), sub = %sub.display(), "Local scan entry");
        local.entry(root).or_default().insert(sub);
        SyncState::RemoteScanning {
          local,
          remote,
          vfs,
          scans_complete,
        }
      }

      (
        SyncState::RemoteScanning {
          mut local,
          remote,
          vfs,
          scans_complete,
        },
        SyncMsg::Events(events),
      ) => {
        // Events during bootstrap are deferred into the merged diff.
        for (root, subs) in events {
          local.entry(root).or_default().extend(subs);
        }
        SyncState::RemoteScanning {
          local,
          remote,
          vfs,
          scans_complete,
        }
      }

      (
        SyncState::RemoteScanning {
          local,
          mut remote,
          mut vfs,
          scans_complete,
        },
        SyncMsg::RemoteScanned { base, sub, sig },
      ) => {
        if let Some((idx, _)) = self.mapping.entry_for_remote(&base) {
          vfs[idx].update(&sub, Some(sig));
          remote.entry(base).or_default().insert(sub);
        } else {
          warn!(base = %base, "Remote scan entry for unmapped root");
        }
        SyncState::RemoteScanning {
          local,
          remote,
          vfs,
          scans_complete,
        }
      }

      (
        SyncState::RemoteScanning {
          mut local,
          remote,
          mut vfs,
          scans_complete,
        },
        SyncMsg::LocalScanComplete | SyncMsg::RemoteScanComplete,
      ) => {
        let scans_complete = scans_complete + 1;
        if scans_complete < 2 {
          SyncState::RemoteScanning {
            local,
            remote,
            vfs,
            scans_complete,
          }
        } else {
          // Any path present locally *or* remotely takes part in the
          // initial diff, so stale remote state is cleaned up too.
          for (base, subs) in remote {
            if let Some((_, entry)) = self.mapping.entry_for_remote(&base) {
              local.entry(entry.local_root.clone()).or_default().extend(subs);
            }
          }
          info!(
            paths = local.values().map(BTreeSet::len).sum::<usize>(),
            "Both scans complete; running initial sync"
          );
          self.execute_sync(&local, &mut vfs);
          SyncState::Waiting { vfs }
        }
      }

      (SyncState::Waiting { mut vfs }, SyncMsg::Events(events)) => {
        self.execute_sync(&events, &mut vfs);
        SyncState::Waiting { vfs }
      }

      // Stray scan traffic in steady state is harmless.
      (SyncState::Waiting { vfs }, msg) => {
        trace!(msg = ?msg, "Ignoring message in steady state");
        SyncState::Waiting { vfs }
      }
    };

    ControlFlow::Continue(())
  }
}

// ============================================================================
// Cycle planning
// ============================================================================

struct EntryPlan {
  units: Vec<SyncUnit>,
  failed: BTreeSet<PathBuf>,
  files: u64,
  example: Option<PathBuf>,
}

/// Diff one mapping entry's changed paths against its mirror.
///
/// Ordering is two-pass: creations and modifications sorted by path length
/// ascending (parents before children), then deletions sorted by path
/// length descending (children before parents). A path changing kind gets
/// its replacement delete inline, immediately before the create.
///
/// The mirror is updated to the intended post-state as operations are
/// planned; the agent session's replay buffer carries them to the agent.
fn plan_entry(entry: &MapEntry, subs: &BTreeSet<PathBuf>, vfs: &mut Vfs<Signature>) -> EntryPlan {
  let mut creations: Vec<(usize, PathBuf, Vec<SyncUnit>)> = Vec::new();
  let mut deletions: Vec<(usize, PathBuf, SyncUnit)> = Vec::new();
  // Mirror prunes are deferred: removing a directory node would hide its
  // children from the lookups that emit their deletions.
  let mut prunes: Vec<PathBuf> = Vec::new();
  let mut failed = BTreeSet::new();
  let mut files = 0u64;
  let mut example = None;

  for sub in subs {
    let local_path = entry.local_root.join(sub);
    let sig_local = match fs::signature_of(&local_path) {
      Ok(sig) => sig,
      Err(e) => {
        warn!(path = %local_path.display(), error = %e, "Failed to read local state; will retry");
        failed.insert(sub.clone());
        continue;
      }
    };
    let sig_remote = vfs.get(sub).cloned();
    if sig_local == sig_remote {
      continue;
    }

    let rpath = remote_path(&entry.remote_root, sub);
    let weight = sub.as_os_str().len();

    match sig_local {
      None => {
        let unit = match sig_remote {
          Some(Signature::Dir { .. }) => SyncUnit::Rpc(Rpc::RmDir { path: rpath }),
          Some(_) => SyncUnit::Rpc(Rpc::Delete { path: rpath }),
          // Unequal yet both absent cannot happen; guarded above.
          None => continue,
        };
        prunes.push(sub.clone());
        deletions.push((weight, sub.clone(), unit));
      }

      Some(local) => {
        let mut ops = Vec::new();
        match &local {
          Signature::Dir { perm } => match &sig_remote {
            Some(Signature::Dir { .. }) => {
              ops.push(SyncUnit::Rpc(Rpc::SetPerm {
                path: rpath.clone(),
                perm: *perm,
              }));
            }
            Some(_) => {
              ops.push(SyncUnit::Rpc(Rpc::Delete { path: rpath.clone() }));
              ops.push(SyncUnit::Rpc(Rpc::MkDir {
                path: rpath.clone(),
                perm: *perm,
              }));
            }
            None => {
              ops.push(SyncUnit::Rpc(Rpc::MkDir {
                path: rpath.clone(),
                perm: *perm,
              }));
            }
          },

          Signature::Symlink { target } => {
            match &sig_remote {
              Some(Signature::Dir { .. }) => {
                ops.push(SyncUnit::Rpc(Rpc::RmDir { path: rpath.clone() }));
              }
              Some(Signature::File { .. }) => {
                ops.push(SyncUnit::Rpc(Rpc::Delete { path: rpath.clone() }));
              }
              Some(Signature::Symlink { .. }) | None => {}
            }
            ops.push(SyncUnit::Rpc(Rpc::SetSymlink {
              path: rpath.clone(),
              target: target.clone(),
            }));
          }

          Signature::File {
            perm,
            block_hashes,
            size,
          } => {
            let prev = match &sig_remote {
              Some(Signature::File {
                block_hashes: prev_hashes,
                size: prev_size,
                ..
              }) => {
                if block_hashes == prev_hashes && size == prev_size {
                  // Content identical; only the permission bits moved.
                  ops.push(SyncUnit::Rpc(Rpc::SetPerm {
                    path: rpath.clone(),
                    perm: *perm,
                  }));
                  vfs.update(sub, Some(local.clone()));
                  creations.push((weight, sub.clone(), ops));
                  continue;
                }
                Some(prev_hashes.clone())
              }
              Some(Signature::Dir { .. }) => {
                ops.push(SyncUnit::Rpc(Rpc::RmDir { path: rpath.clone() }));
                None
              }
              // Writing through a symlink would follow it on the agent.
              Some(Signature::Symlink { .. }) => {
                ops.push(SyncUnit::Rpc(Rpc::Delete { path: rpath.clone() }));
                None
              }
              None => None,
            };

            let chunks = changed_blocks(block_hashes, prev.as_deref());
            if !chunks.is_empty() {
              ops.push(SyncUnit::StartFile(local_path.clone()));
              files += 1;
              example.get_or_insert_with(|| sub.clone());
            }
            ops.push(SyncUnit::Rpc(Rpc::PrepareFile {
              path: rpath.clone(),
              perm: *perm,
              total_blocks: block_hashes.len() as u64,
            }));
            let count = block_hashes.len() as u64;
            for index in chunks {
              ops.push(SyncUnit::SendChunk {
                local_src: entry.local_root.clone(),
                remote_dest: entry.remote_root.clone(),
                sub_path: sub.clone(),
                index,
                count,
              });
            }
          }
        }

        vfs.update(sub, Some(local));
        creations.push((weight, sub.clone(), ops));
      }
    }
  }

  for sub in prunes {
    vfs.update(&sub, None);
  }

  creations.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
  deletions.sort_by(|a, b| (b.0, &b.1).cmp(&(a.0, &a.1)));

  let mut units: Vec<SyncUnit> = Vec::new();
  for (_, _, ops) in creations {
    units.extend(ops);
  }
  for (_, _, unit) in deletions {
    units.push(unit);
  }

  EntryPlan {
    units,
    failed,
    files,
    example,
  }
}

/// Indices of blocks that differ from the previous hashes, treating
/// absent previous blocks as mismatching.
fn changed_blocks(current: &[BlockHash], prev: Option<&[BlockHash]>) -> Vec<u64> {
  let prev = prev.unwrap_or(&[]);
  current
    .iter()
    .enumerate()
    .filter(|(i, hash)| prev.get(*i) != Some(*hash))
    .map(|(i, _)| i as u64)
    .collect()
}
