//! Message types exchanged between the actors.

use std::{
  collections::{BTreeSet, HashMap, HashSet},
  path::PathBuf,
};

use tether_proto::{Response, Rpc};

/// Raw event input for the debouncer.
#[derive(Debug)]
pub enum DebounceMsg {
  /// A burst of absolute paths reported by the filesystem watcher.
  Paths(HashSet<PathBuf>),
  /// A delayed self-send armed when the accumulator last grew. The count
  /// is the accumulator size at arming time; a trigger whose count no
  /// longer matches has been superseded and is ignored.
  Trigger(usize),
}

/// Input for the per-root ignore filter.
#[derive(Debug)]
pub enum SkipMsg {
  /// Perform the initial filtered walk of every local root.
  Scan,
  /// Route and filter a debounced batch of absolute paths.
  Paths(HashSet<PathBuf>),
}

/// Input for the sync engine.
#[derive(Debug)]
pub enum SyncMsg {
  /// One entry of the initial local walk.
  LocalScanned {
    root: PathBuf,
    sub: PathBuf,
    sig: tether_core::Signature,
  },
  /// The local walk finished (all roots).
  LocalScanComplete,
  /// One entry of the agent's scan of a remote root.
  RemoteScanned {
    base: String,
    sub: PathBuf,
    sig: tether_core::Signature,
  },
  /// The agent acknowledged the scan request: its tree has been fully
  /// reported.
  RemoteScanComplete,
  /// A filtered change batch, keyed by local root. Roots with no
  /// surviving changes are present with empty sets.
  Events(HashMap<PathBuf, BTreeSet<PathBuf>>),
}

/// One unit of work streamed from the sync engine to the agent session.
///
/// `Rpc`, `RemoteScan`, `SendChunk` and `Complete` are remote-bound and
/// participate in the replay buffer; `StartFile` and `FileTotals` are
/// local progress markers.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUnit {
  /// Barrier: acked once the agent has applied everything before it.
  Complete,
  /// Ask the agent to enumerate its roots.
  RemoteScan(Vec<String>),
  /// A single metadata or small operation, already fully resolved.
  Rpc(Rpc),
  /// Diagnostic marker that a file's chunk stream is beginning.
  StartFile(PathBuf),
  /// One block of a file, resolved to a concrete `WriteChunk` at send
  /// time by re-reading the file.
  SendChunk {
    local_src: PathBuf,
    remote_dest: String,
    sub_path: PathBuf,
    index: u64,
    count: u64,
  },
  /// Progress metadata: how many files this cycle rewrites.
  FileTotals { total: u64, example: PathBuf },
}

impl SyncUnit {
  /// True for units that are sent to the agent and await an ack.
  pub fn is_remote(&self) -> bool {
    matches!(
      self,
      SyncUnit::Complete | SyncUnit::RemoteScan(_) | SyncUnit::Rpc(_) | SyncUnit::SendChunk { .. }
    )
  }
}

/// Input for the agent session actor.
#[derive(Debug)]
pub enum AgentMsg {
  /// Work from the sync engine.
  Send(SyncUnit),
  /// A framed response read by the stdout demux task. `generation`
  /// identifies the agent incarnation the reader belongs to; responses
  /// from a dead incarnation are dropped.
  Receive { generation: u64, response: Response },
  /// The stdout demux task hit an I/O error or EOF.
  ReadFailed { generation: u64 },
  /// Delayed self-send armed by the backoff schedule.
  AttemptReconnect,
  /// User-initiated restart; resets the backoff to zero.
  ForceRestart,
  /// Tear down the agent and stop the actor.
  Close,
}

/// Input for the status aggregator.
#[derive(Debug)]
pub enum StatusMsg {
  /// Work is flowing; show the sync icon.
  Syncing,
  /// The session drained completely; show the done icon and reset.
  Done,
  /// Transport trouble; show the error icon.
  Error { tooltip: String },
  /// The session gave up; show the inert icon.
  Greyed { tooltip: String },
  /// Progress accumulation since the last `Done`.
  FilesAndBytes { files: u64, bytes: u64 },
  /// This cycle rewrites `total` more files; `example` names one.
  FileTotals { total: u64, example: PathBuf },
  /// Delayed self-send closing the flicker-suppression window.
  Debounce,
}
