// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod nbio;
pub mod spawn;

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

pub use spawn::{ExitStatus, NativePty, SpawnRequest};

/// Terminal backend abstraction over a PTY-spawned child process.
///
/// Object-safe for use as `Box<dyn Backend>` so `TerminalMux` and
/// `AssistantMux` share one spawn/stream/resize contract regardless of
/// what they spawn (a shell, or an assistant-CLI).
pub trait Backend: Send + Sync + 'static {
    /// Drive the PTY's I/O loop to completion. Takes `&self` (not `&mut
    /// self`): the only mutable state (window size, fd readiness) is
    /// managed through atomics/kernel-level synchronization, so a single
    /// `Arc<dyn Backend>` can be shared between the task driving `run` and
    /// the caller issuing `resize`/`child_pid`.
    fn run(
        &self,
        output_tx: mpsc::Sender<Bytes>,
        input_rx: mpsc::Receiver<Bytes>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>>;

    fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()>;

    fn child_pid(&self) -> Option<u32>;

    /// Terminate the child immediately (SIGHUP then SIGKILL). Unlike
    /// `Drop`, this is callable while other `Arc<dyn Backend>` clones (e.g.
    /// the task driving `run`) are still alive, so teardown paths that
    /// remove an instance from a map without necessarily dropping the last
    /// reference can still guarantee the process is gone.
    fn kill(&self) -> anyhow::Result<()>;
}
