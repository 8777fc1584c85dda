//! Resource loading with the cache, decoded, network fallback chain.

use super::cache::{CacheStorage, ResourceCache};
use super::mime::{file_name_of, mime_type_for};
use crate::config::{ResourceConfig, WorkerInitSettings};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Network access for the loader.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `path`. A non-success response is `Ok(None)`.
    async fn fetch(&self, path: &str) -> Result<Option<Resource>>;
}

/// Turns an encoded framework resource back into its original bytes.
pub trait ResourceDecoder: Send + Sync {
    fn decode(&self, encoded: &[u8]) -> std::result::Result<Bytes, String>;
}

impl<F> ResourceDecoder for F
where
    F: Fn(&[u8]) -> std::result::Result<Bytes, String> + Send + Sync,
{
    fn decode(&self, encoded: &[u8]) -> std::result::Result<Bytes, String> {
        self(encoded)
    }
}

struct DecoderSetup {
    decoder: Arc<dyn ResourceDecoder>,
    suffix: String,
}

/// Fetches resources from the cache, then the decoded representation,
/// then the network.
pub struct ResourceLoader {
    cache: Option<Arc<dyn ResourceCache>>,
    decoder: Option<DecoderSetup>,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("cache", &self.cache.is_some())
            .field(
                "decoder_suffix",
                &self.decoder.as_ref().map(|setup| setup.suffix.as_str()),
            )
            .finish_non_exhaustive()
    }
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache: None,
            decoder: None,
            fetcher,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResourceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Try `<path><suffix>` through `decoder` for framework paths.
    pub fn with_decoder(mut self, decoder: Arc<dyn ResourceDecoder>, suffix: impl Into<String>) -> Self {
        self.decoder = Some(DecoderSetup {
            decoder,
            suffix: suffix.into(),
        });
        self
    }

    /// Build the loader a worker's init settings describe.
    ///
    /// `UseResourceCache` opens the cache named by `CacheName` from `caches`;
    /// a missing cache is logged and skipped. `ResourceDecoderPath` requires
    /// a `decoder` and a `ResourceSuffix`.
    pub fn from_settings(
        settings: &WorkerInitSettings,
        fetcher: Arc<dyn Fetcher>,
        caches: &CacheStorage,
        decoder: Option<Arc<dyn ResourceDecoder>>,
    ) -> Result<Self> {
        let mut loader = Self::new(fetcher);

        if settings.use_resource_cache {
            match settings.cache_name.as_deref() {
                Some(name) => match caches.open(name) {
                    Some(cache) => {
                        debug!("Using resource cache '{}'", name);
                        loader = loader.with_cache(cache);
                    }
                    None => warn!("Resource cache '{}' does not exist", name),
                },
                None => warn!("UseResourceCache is set without a CacheName"),
            }
        }

        match (settings.decoder_script_path(), decoder) {
            (Some(script), Some(decoder)) => {
                let suffix = settings.resource_suffix.clone().ok_or_else(|| {
                    BridgeError::config("ResourceSuffix must be set with ResourceDecoderPath")
                })?;
                debug!(
                    "Decoding framework resources with '{}' ({})",
                    script,
                    settings
                        .resource_decode_method_name
                        .as_deref()
                        .unwrap_or("default method")
                );
                loader = loader.with_decoder(decoder, suffix);
            }
            (Some(script), None) => {
                return Err(BridgeError::config(format!(
                    "no decoder was provided for '{}'",
                    script
                )));
            }
            (None, Some(_)) => debug!("Ignoring decoder; ResourceDecoderPath is not set"),
            (None, None) => {}
        }
        Ok(loader)
    }

    async fn from_cache(&self, path: &str) -> Result<Option<Bytes>> {
        match &self.cache {
            Some(cache) => cache.lookup(path).await,
            None => Ok(None),
        }
    }

    async fn from_decoded(&self, path: &str) -> Result<Option<Bytes>> {
        let Some(setup) = &self.decoder else {
            return Ok(None);
        };
        if !path.contains(ResourceConfig::FRAMEWORK_SEGMENT) {
            return Ok(None);
        }
        let encoded_path = format!("{}{}", path, setup.suffix);
        let Some(encoded) = self.fetcher.fetch(&encoded_path).await? else {
            warn!(
                "Failed to fetch encoded resource '{}'; falling back to '{}'",
                encoded_path, path
            );
            return Ok(None);
        };
        let decoded = setup
            .decoder
            .decode(&encoded.bytes)
            .map_err(|message| BridgeError::DecodeFailed {
                path: path.to_string(),
                message,
            })?;
        debug!(
            "Decoded '{}' ({} -> {} bytes)",
            path,
            encoded.bytes.len(),
            decoded.len()
        );
        Ok(Some(decoded))
    }

    /// Fetch a resource's bytes.
    pub async fn fetch_bytes(&self, path: &str) -> Result<Bytes> {
        if let Some(bytes) = self.from_cache(path).await? {
            debug!("Cache hit for '{}'", path);
            return Ok(bytes);
        }
        if let Some(bytes) = self.from_decoded(path).await? {
            return Ok(bytes);
        }
        if let Some(resource) = self.fetcher.fetch(path).await? {
            return Ok(resource.bytes);
        }
        Err(BridgeError::ResourceUnavailable {
            path: path.to_string(),
        })
    }

    /// Fetch a resource with its content type.
    ///
    /// Decoded payloads get the type derived from the file extension.
    pub async fn fetch_resource(&self, path: &str) -> Result<Resource> {
        let by_extension = || mime_type_for(file_name_of(path)).map(str::to_string);

        if let Some(bytes) = self.from_cache(path).await? {
            debug!("Cache hit for '{}'", path);
            return Ok(Resource {
                bytes,
                content_type: by_extension(),
            });
        }
        if let Some(bytes) = self.from_decoded(path).await? {
            return Ok(Resource {
                bytes,
                content_type: by_extension(),
            });
        }
        if let Some(resource) = self.fetcher.fetch(path).await? {
            return Ok(resource);
        }
        Err(BridgeError::ResourceUnavailable {
            path: path.to_string(),
        })
    }
}

/// Network fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base: Option<Url>,
}

impl HttpFetcher {
    pub fn new(base: Option<Url>) -> Result<Self> {
        Self::with_timeout(base, ResourceConfig::FETCH_TIMEOUT)
    }

    pub fn with_timeout(base: Option<Url>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;
        Ok(Self { client, base })
    }

    /// Absolute URL for `path`, resolved against the base when relative.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        match Url::parse(path) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => Ok(base.join(path)?),
                None => Err(BridgeError::Config {
                    message: format!("relative resource path '{}' without a base URL", path),
                }),
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Option<Resource>> {
        let url = self.resolve(path)?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            debug!("GET {} returned {}", url, response.status());
            return Ok(None);
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok(Some(Resource {
            bytes,
            content_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::cache::MemoryCache;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed bodies and records every requested path.
    #[derive(Default)]
    struct MapFetcher {
        bodies: HashMap<String, Bytes>,
        requested: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn with(mut self, path: &str, body: &'static [u8]) -> Self {
            self.bodies.insert(path.to_string(), Bytes::from_static(body));
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, path: &str) -> Result<Option<Resource>> {
            self.requested.lock().unwrap().push(path.to_string());
            Ok(self.bodies.get(path).map(|bytes| Resource {
                bytes: bytes.clone(),
                content_type: Some("text/plain".to_string()),
            }))
        }
    }

    fn reverse_decoder() -> Arc<dyn ResourceDecoder> {
        Arc::new(|encoded: &[u8]| -> std::result::Result<Bytes, String> {
            Ok(encoded.iter().rev().copied().collect::<Vec<u8>>().into())
        })
    }

    #[tokio::test]
    async fn test_cache_wins() {
        let fetcher = Arc::new(MapFetcher::default().with("_framework/App.dll", b"network"));
        let cache = Arc::new(MemoryCache::new());
        cache.insert("_framework/App.dll", &b"cached"[..]);
        let loader = ResourceLoader::new(fetcher.clone()).with_cache(cache);

        assert_eq!(&loader.fetch_bytes("_framework/App.dll").await.unwrap()[..], b"cached");
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_decoded_before_network() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .with("_framework/App.dll.br", b"dedoc")
                .with("_framework/App.dll", b"network"),
        );
        let loader = ResourceLoader::new(fetcher.clone()).with_decoder(reverse_decoder(), ".br");

        let resource = loader.fetch_resource("_framework/App.dll").await.unwrap();
        assert_eq!(&resource.bytes[..], b"coded");
        assert_eq!(
            resource.content_type.as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(fetcher.requested(), vec!["_framework/App.dll.br".to_string()]);
    }

    #[tokio::test]
    async fn test_decoder_only_applies_to_framework_paths() {
        let fetcher = Arc::new(MapFetcher::default().with("css/site.css", b"body{}"));
        let loader = ResourceLoader::new(fetcher.clone()).with_decoder(reverse_decoder(), ".br");

        let resource = loader.fetch_resource("css/site.css").await.unwrap();
        assert_eq!(&resource.bytes[..], b"body{}");
        // Network responses keep their own content type.
        assert_eq!(resource.content_type.as_deref(), Some("text/plain"));
        assert_eq!(fetcher.requested(), vec!["css/site.css".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_encoded_falls_back_to_network() {
        let fetcher = Arc::new(MapFetcher::default().with("_framework/dotnet.wasm", b"\0asm"));
        let loader = ResourceLoader::new(fetcher.clone()).with_decoder(reverse_decoder(), ".br");
        assert_eq!(
            &loader.fetch_bytes("_framework/dotnet.wasm").await.unwrap()[..],
            b"\0asm"
        );
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_all_sources_exhausted() {
        let loader = ResourceLoader::new(Arc::new(MapFetcher::default()))
            .with_cache(Arc::new(MemoryCache::new()));
        let err = loader.fetch_bytes("_framework/missing.dll").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch '_framework/missing.dll'");
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_decoder_failure_surfaces() {
        let fetcher = Arc::new(MapFetcher::default().with("_framework/App.dll.br", b"x"));
        let failing: Arc<dyn ResourceDecoder> =
            Arc::new(|_: &[u8]| -> std::result::Result<Bytes, String> { Err("bad stream".to_string()) });
        let loader = ResourceLoader::new(fetcher).with_decoder(failing, ".br");
        assert!(matches!(
            loader.fetch_bytes("_framework/App.dll").await,
            Err(BridgeError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn test_http_fetcher_resolves_relative_paths() {
        let base = Url::parse("https://localhost/app/").unwrap();
        let fetcher = HttpFetcher::new(Some(base)).unwrap();
        assert_eq!(
            fetcher.resolve("_framework/dotnet.wasm").unwrap().as_str(),
            "https://localhost/app/_framework/dotnet.wasm"
        );
        assert_eq!(
            fetcher.resolve("https://cdn/x.js").unwrap().as_str(),
            "https://cdn/x.js"
        );
        let no_base = HttpFetcher::new(None).unwrap();
        assert!(matches!(
            no_base.resolve("x.js"),
            Err(BridgeError::Config { .. })
        ));
    }

    fn loader_settings() -> WorkerInitSettings {
        WorkerInitSettings {
            script_execute_path: "_content/WebResource".to_string(),
            resource_decoder_path: Some("decode.js".to_string()),
            resource_suffix: Some(".br".to_string()),
            use_resource_cache: true,
            cache_name: Some("blazor-resources".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_from_settings_wires_cache_and_decoder() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .with("_framework/App.dll.br", b"dedoc")
                .with("_framework/App.dll", b"network"),
        );
        let cache = Arc::new(MemoryCache::new());
        cache.insert("app.js", &b"cached"[..]);
        let caches = CacheStorage::new();
        caches.insert("blazor-resources", cache);

        let loader = ResourceLoader::from_settings(
            &loader_settings(),
            fetcher.clone(),
            &caches,
            Some(reverse_decoder()),
        )
        .unwrap();

        assert_eq!(&loader.fetch_bytes("app.js").await.unwrap()[..], b"cached");
        assert_eq!(&loader.fetch_bytes("_framework/App.dll").await.unwrap()[..], b"coded");
        assert_eq!(fetcher.requested(), vec!["_framework/App.dll.br".to_string()]);
    }

    #[tokio::test]
    async fn test_from_settings_skips_missing_cache() {
        let fetcher = Arc::new(MapFetcher::default().with("app.js", b"network"));
        let settings = WorkerInitSettings {
            resource_decoder_path: None,
            ..loader_settings()
        };
        let loader =
            ResourceLoader::from_settings(&settings, fetcher, &CacheStorage::new(), None).unwrap();
        assert_eq!(&loader.fetch_bytes("app.js").await.unwrap()[..], b"network");
    }

    #[test]
    fn test_from_settings_requires_decoder_and_suffix() {
        let fetcher = Arc::new(MapFetcher::default());
        let caches = CacheStorage::new();
        assert!(matches!(
            ResourceLoader::from_settings(&loader_settings(), fetcher.clone(), &caches, None),
            Err(BridgeError::Config { .. })
        ));

        let no_suffix = WorkerInitSettings {
            resource_suffix: None,
            ..loader_settings()
        };
        assert!(matches!(
            ResourceLoader::from_settings(&no_suffix, fetcher, &caches, Some(reverse_decoder())),
            Err(BridgeError::Config { .. })
        ));
    }
}
