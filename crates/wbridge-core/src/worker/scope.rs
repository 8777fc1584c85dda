//! Worker-context facade.

use super::WorkerPort;
use crate::config::{EndpointConfig, WorkerInitSettings};
use crate::endpoint::{BridgeEndpoint, Completion, ManagedReceiver};
use crate::envelope::{Envelope, WireMessage};
use crate::error::{BridgeError, Result};
use crate::resource::{CacheStorage, Fetcher, ResourceDecoder, ResourceLoader};
use crate::sync::BlockingTransport;
use crate::text::decode_json;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source id a worker uses for its parent.
const PARENT_SOURCE: u32 = 0;

/// Data files the runtime needs before it starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeData {
    /// Time-zone archive, when `TimeZoneFileName` is set.
    pub time_zone: Option<Bytes>,
    /// ICU data; `None` means the runtime runs with the invariant culture.
    pub icu: Option<Bytes>,
}

/// A worker's view of the bridge. Everything it sends goes to the parent.
pub struct WorkerScope<P: WorkerPort> {
    settings: WorkerInitSettings,
    endpoint: BridgeEndpoint,
    port: P,
    sync: Option<Arc<dyn BlockingTransport>>,
    invariant_culture: bool,
}

impl<P: WorkerPort> WorkerScope<P> {
    /// Parse the init settings, build the worker endpoint and announce
    /// the worker to its parent with `Init`.
    pub fn bootstrap(
        init: &[u8],
        port: P,
        receiver: Box<dyn ManagedReceiver>,
        control_len: Option<usize>,
    ) -> Result<Self> {
        let settings = decode_json::<WorkerInitSettings>(init)?.with_environment_defaults();
        settings.validate()?;
        let config = EndpointConfig::default().with_control_len(control_len);
        let endpoint = BridgeEndpoint::new_worker(config, receiver)?;
        port.post(Envelope::Init.into_wire())?;
        info!(
            "Worker bootstrapped (receiver {}, culture {}, time zone {})",
            endpoint.receiver_id(),
            settings.culture.as_deref().unwrap_or("invariant"),
            settings.time_zone_string.as_deref().unwrap_or("UTC")
        );
        Ok(Self {
            settings,
            endpoint,
            port,
            sync: None,
            invariant_culture: false,
        })
    }

    pub fn with_sync_transport(mut self, transport: Arc<dyn BlockingTransport>) -> Self {
        self.sync = Some(transport);
        self
    }

    pub fn settings(&self) -> &WorkerInitSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> &BridgeEndpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut BridgeEndpoint {
        &mut self.endpoint
    }

    fn check_source(source: u32) -> Result<()> {
        if source != PARENT_SOURCE {
            return Err(BridgeError::UnsupportedSource(source));
        }
        Ok(())
    }

    /// Resource loader described by this worker's settings.
    pub fn resource_loader(
        &self,
        fetcher: Arc<dyn Fetcher>,
        caches: &CacheStorage,
        decoder: Option<Arc<dyn ResourceDecoder>>,
    ) -> Result<ResourceLoader> {
        ResourceLoader::from_settings(&self.settings, fetcher, caches, decoder)
    }

    pub fn uses_invariant_culture(&self) -> bool {
        self.invariant_culture
    }

    /// Fetch the time-zone archive named by `TimeZoneFileName`.
    pub async fn load_time_zone_data(&self, loader: &ResourceLoader) -> Result<Option<Bytes>> {
        let Some(name) = self.settings.time_zone_file_name.as_deref() else {
            return Ok(None);
        };
        let url = self.settings.framework_url(name)?;
        let data = loader.fetch_bytes(url.as_str()).await?;
        debug!("Loaded time zone data {} ({} bytes)", name, data.len());
        Ok(Some(data))
    }

    /// Fetch ICU data for the configured culture.
    ///
    /// When it cannot be fetched the worker switches to the invariant culture
    /// and `Ok(None)` is returned.
    pub async fn load_icu_data(&mut self, loader: &ResourceLoader) -> Result<Option<Bytes>> {
        let name = self.settings.icu_data_file_name();
        let url = self.settings.framework_url(name)?;
        match loader.fetch_bytes(url.as_str()).await {
            Ok(data) => {
                debug!("Loaded ICU data {} ({} bytes)", name, data.len());
                self.invariant_culture = false;
                Ok(Some(data))
            }
            Err(BridgeError::ResourceUnavailable { path }) => {
                warn!(
                    "Failed to fetch ICU data '{}'; falling back to the invariant culture",
                    path
                );
                self.invariant_culture = true;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Time-zone data first, then ICU data.
    pub async fn load_runtime_data(&mut self, loader: &ResourceLoader) -> Result<RuntimeData> {
        let time_zone = self.load_time_zone_data(loader).await?;
        let icu = self.load_icu_data(loader).await?;
        Ok(RuntimeData { time_zone, icu })
    }

    /// Environment variables the runtime is started with.
    pub fn runtime_environment(&self) -> Vec<(&'static str, String)> {
        let mut env = Vec::with_capacity(4);
        if self.invariant_culture {
            env.push(("DOTNET_SYSTEM_GLOBALIZATION_INVARIANT", "1".to_string()));
        } else if let Some(culture) = self.settings.culture.as_deref() {
            env.push(("LANG", format!("{}.UTF-8", culture)));
        }
        if let Some(tz) = self.settings.time_zone_string.as_deref() {
            env.push(("TZ", tz.to_string()));
        }
        env.push((
            "DOTNET_SYSTEM_GLOBALIZATION_PREDEFINED_CULTURES_ONLY",
            "1".to_string(),
        ));
        env
    }

    /// Fetch every assembly listed in the settings from the framework directory.
    pub async fn fetch_assemblies(&self, loader: &ResourceLoader) -> Result<Vec<(String, Bytes)>> {
        let mut assemblies = Vec::with_capacity(self.settings.assemblies.len());
        for name in &self.settings.assemblies {
            let url = self.settings.framework_url(name)?;
            let bytes = loader.fetch_bytes(url.as_str()).await?;
            debug!("Loaded assembly {} ({} bytes)", name, bytes.len());
            assemblies.push((name.clone(), bytes));
        }
        Ok(assemblies)
    }

    /// Handle one message from the parent.
    pub fn on_message(&mut self, message: WireMessage) -> Result<()> {
        match self.endpoint.handle_message(message, PARENT_SOURCE)? {
            Completion::Pending => Ok(()),
            Completion::Result => self.return_result(PARENT_SOURCE),
            Completion::VoidResult => self.return_void_result(PARENT_SOURCE),
            Completion::SyncResult => {
                let transport = self.sync_transport()?;
                self.endpoint.return_result_sync(transport.as_ref())
            }
            Completion::SyncVoidResult => {
                let transport = self.sync_transport()?;
                self.endpoint.return_void_result_sync(transport.as_ref())
            }
        }
    }

    /// Send the outgoing call in the codec to the parent.
    pub fn scall(&mut self, source: u32) -> Result<()> {
        Self::check_source(source)?;
        let message = self.endpoint.static_call()?;
        self.port.post(message)
    }

    pub fn return_result(&mut self, source: u32) -> Result<()> {
        Self::check_source(source)?;
        let message = self.endpoint.return_result()?;
        self.port.post(message)
    }

    pub fn return_void_result(&mut self, source: u32) -> Result<()> {
        Self::check_source(source)?;
        let message = self.endpoint.return_void_result()?;
        self.port.post(message)
    }

    fn sync_transport(&self) -> Result<Arc<dyn BlockingTransport>> {
        self.sync.clone().ok_or(BridgeError::SyncUnavailable)
    }

    /// Obtain a source id for a blocking call and publish it in the codec.
    pub fn assign_sync_call_source_id(&mut self) -> Result<i32> {
        let transport = self.sync_transport()?;
        self.endpoint.assign_sync_call_source_id(transport.as_ref())
    }

    /// Block until the result for `id` lands in the codec.
    pub fn wait_sync_call(&mut self, id: i32) -> Result<()> {
        let transport = self.sync_transport()?;
        self.endpoint.wait_sync_result(transport.as_ref(), id)
    }

    /// Pump messages until the parent terminates the worker.
    pub fn run(&mut self) -> Result<()> {
        while let Some(message) = self.port.recv() {
            self.on_message(message)?;
        }
        debug!("Worker message pump closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Codec, OutgoingCall, ReplyTag};
    use crate::endpoint::{Delivery, FnReceiver};
    use crate::envelope::MessageKind;
    use crate::resource::{Fetcher, Resource};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct QueuePort {
        inbox: VecDeque<WireMessage>,
        sent: Arc<Mutex<Vec<WireMessage>>>,
    }

    impl WorkerPort for QueuePort {
        fn post(&self, message: WireMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        fn recv(&mut self) -> Option<WireMessage> {
            self.inbox.pop_front()
        }
    }

    const INIT: &[u8] = br#"{"BasePath":"https://localhost/app/","FrameworkDirName":"_framework","MessageHandlerMethodFullName":"App.Handler","Assemblies":["App.dll","Lib.dll"]}"#;

    fn doubling_receiver() -> Box<dyn ManagedReceiver> {
        Box::new(FnReceiver::new(21, |delivery: Delivery, codec: &mut Codec| {
            if delivery.kind != MessageKind::SCall {
                return Ok(Completion::Pending);
            }
            let call = codec.decode_incoming_call()?;
            let mut doubled = call.args.to_vec();
            doubled.extend_from_slice(&call.args);
            codec.encode_reply(ReplyTag::new(0, 0), &doubled)?;
            Ok(Completion::Result)
        }))
    }

    fn scope(inbox: Vec<WireMessage>) -> (WorkerScope<QueuePort>, Arc<Mutex<Vec<WireMessage>>>) {
        let port = QueuePort {
            inbox: inbox.into(),
            ..Default::default()
        };
        let sent = port.sent.clone();
        let scope = WorkerScope::bootstrap(INIT, port, doubling_receiver(), None).unwrap();
        (scope, sent)
    }

    #[test]
    fn test_bootstrap_announces_init() {
        let (scope, sent) = scope(Vec::new());
        assert_eq!(scope.endpoint().receiver_id(), 21);
        assert!(scope.settings().time_zone_string.is_some());
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], Envelope::Init.into_wire());
    }

    #[test]
    fn test_bootstrap_rejects_bad_settings() {
        let port = QueuePort::default();
        assert!(WorkerScope::bootstrap(b"{}", port, doubling_receiver(), None).is_err());
        let port = QueuePort::default();
        assert!(matches!(
            WorkerScope::bootstrap(b"not json", port, doubling_receiver(), None),
            Err(BridgeError::Json { .. })
        ));
    }

    #[test]
    fn test_run_answers_calls_until_closed() {
        let call = Envelope::SCall {
            name: Bytes::from_static(b"Double"),
            args: Bytes::from_static(b"ab"),
        };
        let (mut scope, sent) = scope(vec![call.into_wire()]);
        scope.run().unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].tag, "Res");
        let record = crate::buffer::ResultRecord::parse(&sent[1].payload[0]).unwrap();
        assert_eq!(&record.payload[..], b"abab");
    }

    #[test]
    fn test_only_parent_source_is_supported() {
        let (mut scope, sent) = scope(Vec::new());
        scope
            .endpoint_mut()
            .codec_mut()
            .encode_outgoing_call(&OutgoingCall::new(&b"Log"[..], &b"\"hi\""[..]))
            .unwrap();
        assert!(matches!(scope.scall(3), Err(BridgeError::UnsupportedSource(3))));
        scope.scall(0).unwrap();
        assert_eq!(sent.lock().unwrap()[1].tag, "SCall");
        assert!(matches!(
            scope.return_void_result(1),
            Err(BridgeError::UnsupportedSource(1))
        ));
    }

    #[test]
    fn test_sync_without_transport_is_unavailable() {
        let (mut scope, _) = scope(Vec::new());
        assert!(matches!(
            scope.assign_sync_call_source_id(),
            Err(BridgeError::SyncUnavailable)
        ));
        assert!(matches!(
            scope.wait_sync_call(1),
            Err(BridgeError::SyncUnavailable)
        ));
    }

    struct Assemblies;

    #[async_trait]
    impl Fetcher for Assemblies {
        async fn fetch(&self, path: &str) -> Result<Option<Resource>> {
            Ok(path.ends_with(".dll").then(|| Resource {
                bytes: Bytes::copy_from_slice(path.as_bytes()),
                content_type: None,
            }))
        }
    }

    #[tokio::test]
    async fn test_fetch_assemblies_from_framework_dir() {
        let (scope, _) = scope(Vec::new());
        let loader = ResourceLoader::new(Arc::new(Assemblies));
        let assemblies = scope.fetch_assemblies(&loader).await.unwrap();
        assert_eq!(assemblies.len(), 2);
        assert_eq!(assemblies[0].0, "App.dll");
        assert_eq!(
            &assemblies[1].1[..],
            b"https://localhost/app/_framework/Lib.dll"
        );
    }

    /// Serves only the files it was given, keyed by full URL.
    struct Files(Vec<(&'static str, &'static [u8])>);

    #[async_trait]
    impl Fetcher for Files {
        async fn fetch(&self, path: &str) -> Result<Option<Resource>> {
            Ok(self
                .0
                .iter()
                .find(|(url, _)| *url == path)
                .map(|(_, body)| Resource {
                    bytes: Bytes::from_static(*body),
                    content_type: None,
                }))
        }
    }

    const RUNTIME_INIT: &[u8] = br#"{"BasePath":"https://localhost/app/","FrameworkDirName":"_framework","MessageHandlerMethodFullName":"App.Handler","DotnetCulture":"ja-JP","TimeZoneString":"Asia/Tokyo","TimeZoneFileName":"dotnet.timezones.blat"}"#;

    fn runtime_scope() -> WorkerScope<QueuePort> {
        WorkerScope::bootstrap(RUNTIME_INIT, QueuePort::default(), doubling_receiver(), None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_runtime_data_loads_time_zone_and_icu() {
        let mut scope = runtime_scope();
        let loader = scope
            .resource_loader(
                Arc::new(Files(vec![
                    ("https://localhost/app/_framework/dotnet.timezones.blat", &b"tz"[..]),
                    ("https://localhost/app/_framework/icudt_CJK.dat", &b"icu"[..]),
                ])),
                &CacheStorage::new(),
                None,
            )
            .unwrap();

        let data = scope.load_runtime_data(&loader).await.unwrap();
        assert_eq!(data.time_zone, Some(Bytes::from_static(b"tz")));
        assert_eq!(data.icu, Some(Bytes::from_static(b"icu")));
        assert!(!scope.uses_invariant_culture());
        let env = scope.runtime_environment();
        assert!(env.contains(&("LANG", "ja-JP.UTF-8".to_string())));
        assert!(env.contains(&("TZ", "Asia/Tokyo".to_string())));
    }

    #[tokio::test]
    async fn test_missing_icu_data_falls_back_to_invariant_culture() {
        let mut scope = runtime_scope();
        let loader = ResourceLoader::new(Arc::new(Files(vec![(
            "https://localhost/app/_framework/dotnet.timezones.blat",
            &b"tz"[..],
        )])));

        let data = scope.load_runtime_data(&loader).await.unwrap();
        assert!(data.time_zone.is_some());
        assert_eq!(data.icu, None);
        assert!(scope.uses_invariant_culture());
        let env = scope.runtime_environment();
        assert!(env.contains(&("DOTNET_SYSTEM_GLOBALIZATION_INVARIANT", "1".to_string())));
        assert!(!env.iter().any(|(name, _)| *name == "LANG"));
    }

    #[tokio::test]
    async fn test_missing_time_zone_data_is_an_error() {
        let mut scope = runtime_scope();
        let loader = ResourceLoader::new(Arc::new(Files(Vec::new())));
        assert!(matches!(
            scope.load_runtime_data(&loader).await,
            Err(BridgeError::ResourceUnavailable { .. })
        ));
    }
}
