//! Centralized configuration for the worker bridge.
//!
//! Constant holders for buffer sizes, synchronous bridge timing and resource
//! lookup, plus the two JSON settings documents exchanged at bootstrap. The
//! settings documents keep the PascalCase field names the host page sends.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Shared buffer sizing.
pub struct BufferConfig;

impl BufferConfig {
    /// Default control buffer length in bytes.
    pub const DEFAULT_CONTROL_LEN: usize = 256;
    /// Smallest control buffer that can hold an outgoing call header.
    pub const MIN_CONTROL_LEN: usize = 28;
    /// Initial data region capacity; every later capacity is this times a power of two.
    pub const DEFAULT_DATA_LEN: usize = 1024;
}

/// Synchronous bridge timing and wire constants.
pub struct SyncConfig;

impl SyncConfig {
    pub const MIN_WAIT: Duration = Duration::from_millis(1);
    pub const MAX_WAIT: Duration = Duration::from_millis(128);
    pub const RESULT_TIMEOUT: Duration = Duration::from_millis(60_000);

    pub const FIRST_SOURCE_ID: u8 = 1;
    pub const LAST_SOURCE_ID: u8 = 254;

    /// Response body meaning "no source id can be assigned".
    pub const NO_ID_SENTINEL: &'static str =
        "6MENWdyDt0p4Qnp9IGYL4OSYj2/Ns9k6uv8yONpN2ph2zNKm+ILRdnvkvl9H7dqFQB+K7aXXDTXo057dUH5vKg";

    /// Value published in the control buffer when no id is available.
    pub const UNAVAILABLE_ID: i32 = -1;

    /// Path the responder intercepts; distinguished by the `action` query.
    pub const ENDPOINT_PATH: &'static str = "_content/WebResource/Dummy.txt";

    pub const ACTION_GET_ID: &'static str = "GetId";
    pub const ACTION_GET_RESULT: &'static str = "GetResult";
    pub const ACTION_SET_RESULT: &'static str = "SetResult";
}

/// Resource lookup constants.
pub struct ResourceConfig;

impl ResourceConfig {
    /// Separator between a resource path and its content hash in cache keys.
    pub const CACHE_HASH_MARKER: &'static str = ".sha256-";
    /// Only paths containing this segment have a decoded representation.
    pub const FRAMEWORK_SEGMENT: &'static str = "_framework/";
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

    /// ICU data shards, chosen by the culture's language.
    pub const ICU_FULL: &'static str = "icudt.dat";
    pub const ICU_EFIGS: &'static str = "icudt_EFIGS.dat";
    pub const ICU_CJK: &'static str = "icudt_CJK.dat";
    pub const ICU_NO_CJK: &'static str = "icudt_no_CJK.dat";
}

/// Receiver id the parent context always uses for its managed receiver.
pub const PARENT_RECEIVER_ID: i32 = 2;

/// Per-endpoint runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Control buffer length in bytes.
    pub control_len: usize,
    /// Initial data region capacity in bytes.
    pub data_len: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            control_len: BufferConfig::DEFAULT_CONTROL_LEN,
            data_len: BufferConfig::DEFAULT_DATA_LEN,
        }
    }
}

impl EndpointConfig {
    /// Use a specific control buffer length, or the default when `None`.
    pub fn with_control_len(mut self, len: Option<usize>) -> Self {
        self.control_len = len.unwrap_or(BufferConfig::DEFAULT_CONTROL_LEN);
        self
    }

    pub fn with_data_len(mut self, len: usize) -> Self {
        self.data_len = len;
        self
    }
}

/// Settings the host hands the parent context when it configures the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentSettings {
    pub worker_script_path: String,
    pub message_receiver_full_name: String,
    pub base_path: String,
}

/// Settings posted to a new worker as its first message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WorkerInitSettings {
    #[serde(rename = "JSExecutePath")]
    pub script_execute_path: String,
    pub base_path: String,
    pub framework_dir_name: String,
    pub app_bin_dir_name: String,
    #[serde(rename = "DotnetJsName")]
    pub runtime_script_name: String,
    #[serde(rename = "DotnetWasmName")]
    pub runtime_wasm_name: String,
    pub resource_decoder_path: Option<String>,
    #[serde(rename = "ResourceDecodeMathodName")]
    pub resource_decode_method_name: Option<String>,
    pub resource_suffix: Option<String>,
    pub use_resource_cache: bool,
    pub cache_name: Option<String>,
    #[serde(rename = "DotnetCulture")]
    pub culture: Option<String>,
    pub time_zone_string: Option<String>,
    pub time_zone_file_name: Option<String>,
    pub message_handler_method_full_name: String,
    pub create_message_receiver_method_full_name: String,
    pub assemblies: Vec<String>,
}

impl WorkerInitSettings {
    /// URL of a file in the framework directory, resolved against the base path.
    pub fn framework_url(&self, file_name: &str) -> Result<Url> {
        let base = Url::parse(&self.base_path)?;
        Ok(base.join(&format!("./{}/{}", self.framework_dir_name, file_name))?)
    }

    /// Path of a script that lives next to the worker script.
    pub fn script_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.script_execute_path, file_name)
    }

    /// Whether framework resources have a decoded representation to try.
    pub fn uses_resource_decoder(&self) -> bool {
        self.resource_decoder_path.is_some()
    }

    /// Where the decoder script lives, next to the worker script.
    pub fn decoder_script_path(&self) -> Option<String> {
        self.resource_decoder_path
            .as_deref()
            .map(|path| self.script_path(path))
    }

    /// ICU data file covering the configured culture.
    pub fn icu_data_file_name(&self) -> &'static str {
        let Some(culture) = self.culture.as_deref() else {
            return ResourceConfig::ICU_FULL;
        };
        let language = culture.split(['-', '_']).next().unwrap_or_default();
        match language.to_ascii_lowercase().as_str() {
            "en" | "fr" | "it" | "de" | "es" => ResourceConfig::ICU_EFIGS,
            "zh" | "ja" | "ko" => ResourceConfig::ICU_CJK,
            _ => ResourceConfig::ICU_NO_CJK,
        }
    }

    /// Fill in culture and time zone from the process environment.
    ///
    /// Falls back to the invariant culture and `UTC` when nothing is set.
    pub fn with_environment_defaults(mut self) -> Self {
        if self.culture.is_none() {
            self.culture = std::env::var("LANG")
                .ok()
                .and_then(|lang| lang.split('.').next().map(str::to_string))
                .filter(|lang| !lang.is_empty() && lang != "C" && lang != "POSIX")
                .map(|lang| lang.replace('_', "-"));
        }
        if self.time_zone_string.is_none() {
            self.time_zone_string =
                Some(std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string()));
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_path.is_empty() {
            return Err(BridgeError::Config {
                message: "BasePath must be set".to_string(),
            });
        }
        if self.message_handler_method_full_name.is_empty() {
            return Err(BridgeError::Config {
                message: "MessageHandlerMethodFullName must be set".to_string(),
            });
        }
        Ok(())
    }
}
