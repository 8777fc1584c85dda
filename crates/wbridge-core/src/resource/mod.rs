//! Binary resources needed to boot a worker.

pub mod cache;
pub mod loader;
pub mod mime;

pub use cache::{cache_key, CacheStorage, MemoryCache, ResourceCache};
pub use loader::{Fetcher, HttpFetcher, Resource, ResourceDecoder, ResourceLoader};
pub use mime::{file_name_of, mime_type_for};
