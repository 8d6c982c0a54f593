// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `HostBridge`: the explicit typed capability the gateway uses to talk to
//! the colocated host process that owns host-side terminal/assistant
//! instances, instead of reaching into a UI runtime via string-evaluated
//! expressions. Object-safe via hand-rolled boxed futures, the same shape
//! the PTY `Backend` trait uses, since this crate's stack does not carry
//! `async-trait`.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::broadcast;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostInstanceStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct HostInstanceInfo {
    pub instance_id: String,
    pub name: Option<String>,
    pub status: HostInstanceStatus,
}

/// The abstract capability by which the gateway communicates with the host.
/// A mismatch between the host's and the gateway's view of existence is
/// resolved in the host's favor.
pub trait HostBridge: Send + Sync {
    fn instance_exists<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, bool>;

    fn instance_status<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Option<HostInstanceStatus>>;

    /// Start (or restart) a host-owned instance. Returns the host pid.
    fn start<'a>(
        &'a self,
        instance_id: &'a str,
        working_directory: &'a str,
        instance_name: Option<&'a str>,
    ) -> BoxFuture<'a, anyhow::Result<i64>>;

    fn stop<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    fn send<'a>(&'a self, instance_id: &'a str, data: &'a [u8]) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Full host-side scrollback. Preferred over the transcoder's own
    /// buffer because the transcoder may not have seen pre-configuration
    /// history.
    fn get_buffer<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>>;

    fn list_instances(&self) -> BoxFuture<'_, Vec<HostInstanceInfo>>;

    /// Subscribe to raw output bytes for a host-owned instance.
    fn subscribe_output<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, broadcast::Receiver<Bytes>>;

    /// Subscribe to "response complete" notifications for a host-owned
    /// instance, detected by the implementor via idle-debounce.
    fn subscribe_response_complete<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, broadcast::Receiver<()>>;
}

/// Production default: no host process is colocated, so no instance ever
/// exists on the host. Discovering and talking to a real colocated host
/// process is left to a deployment-specific `HostBridge` implementation.
#[derive(Default)]
pub struct NullHostBridge;

impl HostBridge for NullHostBridge {
    fn instance_exists<'a>(&'a self, _instance_id: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async { false })
    }

    fn instance_status<'a>(
        &'a self,
        _instance_id: &'a str,
    ) -> BoxFuture<'a, Option<HostInstanceStatus>> {
        Box::pin(async { None })
    }

    fn start<'a>(
        &'a self,
        instance_id: &'a str,
        _working_directory: &'a str,
        _instance_name: Option<&'a str>,
    ) -> BoxFuture<'a, anyhow::Result<i64>> {
        Box::pin(async move { anyhow::bail!("no host instance {instance_id}") })
    }

    fn stop<'a>(&'a self, _instance_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn send<'a>(&'a self, instance_id: &'a str, _data: &'a [u8]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move { anyhow::bail!("no host instance {instance_id}") })
    }

    fn get_buffer<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move { anyhow::bail!("no host instance {instance_id}") })
    }

    fn list_instances(&self) -> BoxFuture<'_, Vec<HostInstanceInfo>> {
        Box::pin(async { Vec::new() })
    }

    fn subscribe_output<'a>(&'a self, _instance_id: &'a str) -> BoxFuture<'a, broadcast::Receiver<Bytes>> {
        Box::pin(async { broadcast::channel(1).1 })
    }

    fn subscribe_response_complete<'a>(
        &'a self,
        _instance_id: &'a str,
    ) -> BoxFuture<'a, broadcast::Receiver<()>> {
        Box::pin(async { broadcast::channel(1).1 })
    }
}

pub mod test_support {
    //! In-memory stub used by `assistant_mux` tests (and by the black-box
    //! `tests/specs` scenarios) to simulate host-owned instances without a
    //! real colocated host process. Not `#[cfg(test)]`-gated so external
    //! integration crates can reach it.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub struct StubInstance {
        pub status: HostInstanceStatus,
        pub output_tx: broadcast::Sender<Bytes>,
        pub complete_tx: broadcast::Sender<()>,
        pub buffer: Vec<u8>,
        pub sent: Vec<Vec<u8>>,
    }

    #[derive(Default)]
    pub struct StubHostBridge {
        instances: Mutex<HashMap<String, StubInstance>>,
    }

    impl StubHostBridge {
        pub fn seed(&self, instance_id: &str, status: HostInstanceStatus, buffer: &[u8]) {
            let (output_tx, _) = broadcast::channel(64);
            let (complete_tx, _) = broadcast::channel(16);
            self.instances.lock().unwrap().insert(
                instance_id.to_string(),
                StubInstance { status, output_tx, complete_tx, buffer: buffer.to_vec(), sent: Vec::new() },
            );
        }

        pub fn emit_output(&self, instance_id: &str, data: &[u8]) {
            if let Some(inst) = self.instances.lock().unwrap().get(instance_id) {
                let _ = inst.output_tx.send(Bytes::copy_from_slice(data));
            }
        }

        pub fn sent_to(&self, instance_id: &str) -> Vec<Vec<u8>> {
            self.instances
                .lock()
                .unwrap()
                .get(instance_id)
                .map(|i| i.sent.clone())
                .unwrap_or_default()
        }
    }

    impl HostBridge for StubHostBridge {
        fn instance_exists<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, bool> {
            let exists = self.instances.lock().unwrap().contains_key(instance_id);
            Box::pin(async move { exists })
        }

        fn instance_status<'a>(
            &'a self,
            instance_id: &'a str,
        ) -> BoxFuture<'a, Option<HostInstanceStatus>> {
            let status = self.instances.lock().unwrap().get(instance_id).map(|i| i.status);
            Box::pin(async move { status })
        }

        fn start<'a>(
            &'a self,
            instance_id: &'a str,
            _working_directory: &'a str,
            _instance_name: Option<&'a str>,
        ) -> BoxFuture<'a, anyhow::Result<i64>> {
            let mut guard = self.instances.lock().unwrap();
            let result = match guard.get_mut(instance_id) {
                Some(inst) => {
                    inst.status = HostInstanceStatus::Connected;
                    Ok(4242)
                }
                None => Err(anyhow::anyhow!("no such host instance")),
            };
            Box::pin(async move { result })
        }

        fn stop<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
            if let Some(inst) = self.instances.lock().unwrap().get_mut(instance_id) {
                inst.status = HostInstanceStatus::Disconnected;
            }
            Box::pin(async { Ok(()) })
        }

        fn send<'a>(&'a self, instance_id: &'a str, data: &'a [u8]) -> BoxFuture<'a, anyhow::Result<()>> {
            let result = match self.instances.lock().unwrap().get_mut(instance_id) {
                Some(inst) => {
                    inst.sent.push(data.to_vec());
                    Ok(())
                }
                None => Err(anyhow::anyhow!("no such host instance")),
            };
            Box::pin(async move { result })
        }

        fn get_buffer<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
            let result = self
                .instances
                .lock()
                .unwrap()
                .get(instance_id)
                .map(|i| i.buffer.clone())
                .ok_or_else(|| anyhow::anyhow!("no such host instance"));
            Box::pin(async move { result })
        }

        fn list_instances(&self) -> BoxFuture<'_, Vec<HostInstanceInfo>> {
            let infos = self
                .instances
                .lock()
                .unwrap()
                .iter()
                .map(|(id, inst)| HostInstanceInfo {
                    instance_id: id.clone(),
                    name: None,
                    status: inst.status,
                })
                .collect();
            Box::pin(async move { infos })
        }

        fn subscribe_output<'a>(
            &'a self,
            instance_id: &'a str,
        ) -> BoxFuture<'a, broadcast::Receiver<Bytes>> {
            let rx = self
                .instances
                .lock()
                .unwrap()
                .get(instance_id)
                .map(|i| i.output_tx.subscribe())
                .unwrap_or_else(|| broadcast::channel(1).1);
            Box::pin(async move { rx })
        }

        fn subscribe_response_complete<'a>(
            &'a self,
            instance_id: &'a str,
        ) -> BoxFuture<'a, broadcast::Receiver<()>> {
            let rx = self
                .instances
                .lock()
                .unwrap()
                .get(instance_id)
                .map(|i| i.complete_tx.subscribe())
                .unwrap_or_else(|| broadcast::channel(1).1);
            Box::pin(async move { rx })
        }
    }
}
