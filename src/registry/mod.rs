//! 转换注册表：每个厂商一个适配器，按需组合出任意 (源, 目标) 转换
//!
//! Transformation registry.
//!
//! Holds one driver per provider. A transformation between two providers is
//! resolved on demand as `source → IR → target`; pairs are never stored.
//! The registry is an explicit value: build it once, then share it by
//! reference (or behind an `Arc`) across threads. Registration takes
//! `&mut self`, so it always happens before concurrent reads.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::TranscodeConfig;
use crate::drivers::{ClaudeAdapter, GeminiAdapter, OpenAiAdapter, ProviderDriver};
use crate::pipeline::StreamTranscoder;
use crate::protocol::{Provider, TransformKind, TransformationPair};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct TransformationRegistry {
    drivers: HashMap<Provider, Arc<dyn ProviderDriver>>,
}

impl TransformationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in OpenAI, Gemini and Claude adapters.
    pub fn with_defaults(config: TranscodeConfig) -> Self {
        let config = Arc::new(config);
        let mut registry = Self::new();
        registry.register(OpenAiAdapter::new(config.clone()));
        registry.register(GeminiAdapter::new(config.clone()));
        registry.register(ClaudeAdapter::new(config));
        registry
    }

    /// Register a driver under its own provider; replaces any earlier one.
    pub fn register<D: ProviderDriver + 'static>(&mut self, driver: D) -> &mut Self {
        self.register_arc(Arc::new(driver))
    }

    pub fn register_arc(&mut self, driver: Arc<dyn ProviderDriver>) -> &mut Self {
        let provider = driver.provider();
        if self.drivers.insert(provider, driver).is_some() {
            tracing::debug!(provider = %provider, "replaced registered adapter");
        }
        self
    }

    pub fn driver(&self, provider: Provider) -> Result<Arc<dyn ProviderDriver>> {
        self.drivers.get(&provider).cloned().ok_or_else(|| {
            Error::unsupported_provider(provider.as_str())
                .with_hint("register an adapter for this provider first")
        })
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.drivers.contains_key(&provider)
    }

    /// Registered providers in canonical order.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.drivers.keys().copied().collect();
        providers.sort();
        providers
    }

    /// Every ordered pair of distinct registered providers.
    pub fn pairs(&self) -> Vec<TransformationPair> {
        let providers = self.providers();
        providers
            .iter()
            .flat_map(|&source| {
                providers
                    .iter()
                    .filter(move |&&target| target != source)
                    .map(move |&target| TransformationPair::new(source, target))
            })
            .collect()
    }

    pub fn supports(&self, source: Provider, target: Provider) -> bool {
        self.contains(source) && self.contains(target)
    }

    /// Convert one payload from `source`'s shape to `target`'s.
    ///
    /// For [`TransformKind::StreamChunk`] the chunk is converted with a fresh
    /// stream session and the result is a JSON array of target chunks.
    pub fn transform(
        &self,
        source: Provider,
        target: Provider,
        kind: TransformKind,
        payload: &Value,
    ) -> Result<Value> {
        let from = self.driver(source)?;
        let to = self.driver(target)?;
        tracing::debug!(source = %source, target = %target, kind = %kind, "transform");

        match kind {
            TransformKind::Request => {
                let ir = from.request_to_ir(payload)?;
                to.request_from_ir(&ir)
            }
            TransformKind::Response => {
                let ir = from.decode_response(payload)?;
                to.encode_response(&ir)
            }
            TransformKind::StreamChunk => {
                let mut transcoder = StreamTranscoder::new(from, to);
                Ok(Value::Array(transcoder.push(payload)?))
            }
        }
    }

    /// Structural validation of a native request, independent of any transform.
    pub fn validate(&self, provider: Provider, request: &Value) -> Result<()> {
        self.driver(provider)?.validate_payload(request)
    }

    /// Start a stream conversion; the returned transcoder owns its session.
    pub fn stream(&self, source: Provider, target: Provider) -> Result<StreamTranscoder> {
        Ok(StreamTranscoder::new(self.driver(source)?, self.driver(target)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_register_three_providers() {
        let registry = TransformationRegistry::with_defaults(TranscodeConfig::default());
        assert_eq!(
            registry.providers(),
            vec![Provider::OpenAi, Provider::Gemini, Provider::Claude]
        );
        assert_eq!(registry.pairs().len(), 6);
        assert!(registry
            .pairs()
            .iter()
            .all(|p| p.source != p.target));
    }

    #[test]
    fn test_missing_adapter_is_unsupported_provider() {
        let mut registry = TransformationRegistry::new();
        registry.register(OpenAiAdapter::default());
        let err = registry
            .transform(
                Provider::OpenAi,
                Provider::Claude,
                TransformKind::Request,
                &json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_provider");
        assert!(registry.pairs().is_empty());
    }

    #[test]
    fn test_stream_chunk_transform_returns_array() {
        let registry = TransformationRegistry::with_defaults(TranscodeConfig::default());
        let out = registry
            .transform(
                Provider::OpenAi,
                Provider::Claude,
                TransformKind::StreamChunk,
                &json!({"id": "c1", "model": "gpt-4o", "choices": [{"index": 0, "delta": {"content": "Hi"}}]}),
            )
            .unwrap();
        let chunks = out.as_array().unwrap();
        assert_eq!(chunks[0]["type"], "message_start");
        assert_eq!(chunks.last().unwrap()["delta"]["text"], "Hi");
    }
}
