//! Parent-context facade: configuration, worker lifecycle and routing.

use super::{WorkerHandle, WorkerSpawner};
use crate::config::{EndpointConfig, EnvironmentSettings};
use crate::endpoint::{BridgeEndpoint, Completion, ManagedReceiver};
use crate::envelope::Inbound;
use crate::error::{BridgeError, Result};
use crate::registry::WorkerRegistry;
use crate::sync::BlockingTransport;
use crate::text::decode_json;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The coordinating context that owns every worker.
pub struct WorkerParent<S: WorkerSpawner> {
    settings: EnvironmentSettings,
    endpoint: BridgeEndpoint,
    spawner: S,
    workers: WorkerRegistry<S::Handle>,
    sync: Option<Arc<dyn BlockingTransport>>,
}

impl<S: WorkerSpawner> WorkerParent<S> {
    /// Parse the environment settings and build the parent endpoint.
    ///
    /// `control_len` picks the control buffer length; `None` uses the default.
    pub fn configure(
        settings_json: &[u8],
        control_len: Option<usize>,
        receiver: Box<dyn ManagedReceiver>,
        spawner: S,
    ) -> Result<Self> {
        let settings: EnvironmentSettings = decode_json(settings_json)?;
        let config = EndpointConfig::default().with_control_len(control_len);
        let endpoint = BridgeEndpoint::new_parent(config, receiver)?;
        info!(
            "Configured worker parent (script {}, receiver {})",
            settings.worker_script_path, settings.message_receiver_full_name
        );
        Ok(Self {
            settings,
            endpoint,
            spawner,
            workers: WorkerRegistry::new(),
            sync: None,
        })
    }

    /// Attach the responder used for synchronous replies.
    pub fn with_sync_transport(mut self, transport: Arc<dyn BlockingTransport>) -> Self {
        self.sync = Some(transport);
        self
    }

    /// Apply new settings. The worker script may not change once set.
    pub fn reconfigure(&mut self, settings_json: &[u8]) -> Result<()> {
        let settings: EnvironmentSettings = decode_json(settings_json)?;
        if settings.worker_script_path != self.settings.worker_script_path {
            return Err(BridgeError::Config {
                message: format!(
                    "Different worker script url was passed: {} (configured {})",
                    settings.worker_script_path, self.settings.worker_script_path
                ),
            });
        }
        if settings.message_receiver_full_name != self.settings.message_receiver_full_name {
            warn!(
                "Message receiver changed from {} to {}",
                self.settings.message_receiver_full_name, settings.message_receiver_full_name
            );
        }
        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> &EnvironmentSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> &BridgeEndpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut BridgeEndpoint {
        &mut self.endpoint
    }

    pub fn workers(&self) -> &WorkerRegistry<S::Handle> {
        &self.workers
    }

    /// Spawn worker `id` with the given init settings document.
    pub fn create_worker(&mut self, id: u32, init_json: &[u8]) -> Result<()> {
        if self.workers.contains(id) {
            return Err(BridgeError::WorkerExists(id));
        }
        let handle = self.spawner.spawn(
            id,
            &self.settings.worker_script_path,
            Bytes::copy_from_slice(init_json),
        )?;
        self.workers.create(id, handle)
    }

    pub fn terminate_worker(&mut self, id: u32) -> Result<()> {
        self.workers.terminate(id)
    }

    /// Forward the outgoing call in the codec to `worker_id`.
    pub fn scall(&mut self, worker_id: u32) -> Result<()> {
        let message = self.endpoint.static_call()?;
        self.workers.get(worker_id)?.post(message)
    }

    /// Send the reply in the codec back to worker `source`.
    pub fn return_result(&mut self, source: u32) -> Result<()> {
        let message = self.endpoint.return_result()?;
        self.workers.get(source)?.post(message)
    }

    pub fn return_void_result(&mut self, source: u32) -> Result<()> {
        let message = self.endpoint.return_void_result()?;
        self.workers.get(source)?.post(message)
    }

    fn sync_transport(&self) -> Result<Arc<dyn BlockingTransport>> {
        self.sync.clone().ok_or(BridgeError::SyncUnavailable)
    }

    pub fn assign_sync_call_source_id(&mut self) -> Result<i32> {
        let transport = self.sync_transport()?;
        self.endpoint.assign_sync_call_source_id(transport.as_ref())
    }

    /// Post the reply in the codec to the responder for a blocked caller.
    pub fn return_result_sync(&mut self) -> Result<()> {
        let transport = self.sync_transport()?;
        self.endpoint.return_result_sync(transport.as_ref())
    }

    pub fn return_void_result_sync(&mut self) -> Result<()> {
        let transport = self.sync_transport()?;
        self.endpoint.return_void_result_sync(transport.as_ref())
    }

    /// Route a message a worker sent, then deliver any reply the receiver wrote.
    pub fn handle_worker_message(&mut self, inbound: Inbound) -> Result<()> {
        let source = inbound.source;
        if !self.workers.contains(source) {
            debug!("Message from unregistered worker {}", source);
        }
        match self.endpoint.handle_message(inbound.message, source)? {
            Completion::Pending => Ok(()),
            Completion::Result => self.return_result(source),
            Completion::VoidResult => self.return_void_result(source),
            Completion::SyncResult => self.return_result_sync(),
            Completion::SyncVoidResult => self.return_void_result_sync(),
        }
    }
}
