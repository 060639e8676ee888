//! SkipActor - routes raw paths to their owning root and applies that
//! root's ignore rules.
//!
//! Holds one compiled [`Skipper`] per mapping entry. Besides filtering
//! debounced event batches it also performs the initial filtered walk of
//! every local root, feeding the sync engine's bootstrap.

use std::{
  collections::{BTreeSet, HashMap, HashSet},
  ops::ControlFlow,
  path::PathBuf,
};

use async_trait::async_trait;
use tether_core::{MapEntry, Mapping};
use tracing::{debug, info, trace};

use super::{
  Actor, Handle,
  message::{SkipMsg, SyncMsg},
};
use crate::fs::{Skipper, walk};

pub struct SkipActor {
  roots: Vec<(MapEntry, Skipper)>,
  sync: Handle<SyncMsg>,
}

impl SkipActor {
  /// Compile the ignore strategy once per mapping entry.
  pub fn new(mapping: &Mapping, strategy: &str, sync: Handle<SyncMsg>) -> Result<Self, ignore::Error> {
    let mut roots = Vec::with_capacity(mapping.len());
    for entry in mapping.entries() {
      let skipper = Skipper::compile(&entry.local_root, strategy)?;
      roots.push((entry.clone(), skipper));
    }
    Ok(Self { roots, sync })
  }

  fn scan(&self) {
    for (entry, skipper) in &self.roots {
      let entries = walk(&entry.local_root, skipper);
      info!(
        root = %entry.local_root.display(),
        entries = entries.len(),
        "Local scan of root complete"
      );
      for (sub, sig) in entries {
        let _ = self.sync.send(SyncMsg::LocalScanned {
          root: entry.local_root.clone(),
          sub,
          sig,
        });
      }
    }
    let _ = self.sync.send(SyncMsg::LocalScanComplete);
  }

  fn filter(&self, values: HashSet<PathBuf>) {
    // Every root is present in the result, empty or not, so the sync
    // engine sees all roots each cycle.
    let mut events: HashMap<PathBuf, BTreeSet<PathBuf>> = self
      .roots
      .iter()
      .map(|(entry, _)| (entry.local_root.clone(), BTreeSet::new()))
      .collect();

    for value in values {
      let Some((entry, skipper)) = self
        .roots
        .iter()
        .find(|(entry, _)| value.starts_with(&entry.local_root))
      else {
        trace!(path = %value.display(), "Event outside any mapped root");
        continue;
      };
      let Ok(sub) = value.strip_prefix(&entry.local_root) else {
        continue;
      };
      let sub = sub.to_path_buf();
      if sub.as_os_str().is_empty() {
        continue;
      }

      let is_dir = value.is_dir();
      if skipper.skip(&sub, is_dir) {
        trace!(path = %value.display(), "Event filtered by ignore rules");
        continue;
      }

      events.entry(entry.local_root.clone()).or_default().insert(sub);
    }

    debug!(
      changed = events.values().map(BTreeSet::len).sum::<usize>(),
      "Forwarding filtered events"
    );
    let _ = self.sync.send(SyncMsg::Events(events));
  }
}

#[async_trait]
impl Actor for SkipActor {
  type Msg = SkipMsg;

  fn name(&self) -> &'static str {
    "skip"
  }

  async fn handle(&mut self, msg: SkipMsg) -> ControlFlow<()> {
    match msg {
      SkipMsg::Scan => self.scan(),
      SkipMsg::Paths(values) => self.filter(values),
    }
    ControlFlow::Continue(())
  }
}
