//! Client configuration.

use std::sync::Arc;

use crate::decode::DecoderRegistry;
use crate::request::CSRF_HEADER;

/// Where the service lives and how its responses are unwrapped.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service root, without a trailing `/` (e.g. `https://host/odata/v2/svc`).
    pub service_root: String,
    /// Path of the batch endpoint below the service root (default: `$batch`).
    pub batch_path: String,
    /// Header used for the anti-forgery token (default: `x-csrf-token`).
    pub csrf_header: String,
    /// Dot path of a collection result in a JSON envelope (default: `d.results`).
    pub list_result_path: String,
    /// Dot path of a single-entity result in a JSON envelope (default: `d`).
    pub instance_result_path: String,
    /// Body decoders handed to every batch built by the client.
    pub decoders: Arc<DecoderRegistry>,
}

impl ClientConfig {
    /// Configuration for `service_root` with defaults everywhere else.
    pub fn new(service_root: &str) -> Self {
        Self {
            service_root: service_root.trim_end_matches('/').to_string(),
            batch_path: "$batch".to_string(),
            csrf_header: CSRF_HEADER.to_string(),
            list_result_path: "d.results".to_string(),
            instance_result_path: "d".to_string(),
            decoders: Arc::new(DecoderRegistry::default()),
        }
    }

    #[must_use]
    pub fn batch_path(mut self, path: &str) -> Self {
        self.batch_path = path.trim_start_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn csrf_header(mut self, name: &str) -> Self {
        self.csrf_header = name.to_string();
        self
    }

    /// Set both JSON envelope paths, e.g. `("value", "")` for OData v4.
    #[must_use]
    pub fn result_paths(mut self, list: &str, instance: &str) -> Self {
        self.list_result_path = list.to_string();
        self.instance_result_path = instance.to_string();
        self
    }

    #[must_use]
    pub fn decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self
    }

    /// Absolute URL of the batch endpoint.
    pub fn batch_url(&self) -> String {
        format!("{}/{}", self.service_root, self.batch_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_odata_v2() {
        let config = ClientConfig::new("http://localhost:3000/odata/");
        assert_eq!(config.service_root, "http://localhost:3000/odata");
        assert_eq!(config.batch_url(), "http://localhost:3000/odata/$batch");
        assert_eq!(config.csrf_header, "x-csrf-token");
        assert_eq!(config.list_result_path, "d.results");
        assert_eq!(config.instance_result_path, "d");
    }

    #[test]
    fn setters_override_defaults() {
        let config = ClientConfig::new("http://h/svc")
            .batch_path("/custom")
            .csrf_header("X-Token")
            .result_paths("value", "");
        assert_eq!(config.batch_url(), "http://h/svc/custom");
        assert_eq!(config.csrf_header, "X-Token");
        assert_eq!(config.list_result_path, "value");
        assert!(config.instance_result_path.is_empty());
    }
}
