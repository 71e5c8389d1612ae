//! Named provider map with per-call selection and contract checks.

use crate::error::{Error, Result};
use crate::model::{ChatOptions, Message, ProviderReply};
use crate::providers::{Provider, ProviderConfig};
use crate::retry::{RetryConfig, retry_async};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Holds the configured providers and routes each chat call to one of them.
///
/// Callers never hold the lock across a provider call: the selected provider
/// is cloned out before the request is sent.
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn Provider>>>,
    default: RwLock<String>,
    retry: RetryConfig,
}

impl ProviderRegistry {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            providers: RwLock::new(BTreeMap::new()),
            default: RwLock::new(default.into()),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Build every configured provider.
    pub fn from_configs(
        default: impl Into<String>,
        configs: &BTreeMap<String, ProviderConfig>,
        retry: RetryConfig,
    ) -> Result<Self> {
        let registry = Self::new(default).with_retry(retry);
        for (name, config) in configs {
            let provider = config
                .build()
                .map_err(|e| Error::Config(format!("provider {name}: {e}")))?;
            registry.register(name.clone(), provider);
        }
        Ok(registry)
    }

    /// Add or replace a provider; returns the one it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Option<Arc<dyn Provider>> {
        let name = name.into();
        debug!(provider = %name, backend = provider.name(), "registered provider");
        self.providers.write().insert(name, provider)
    }

    pub fn set_default(&self, name: impl Into<String>) {
        *self.default.write() = name.into();
    }

    pub fn default_name(&self) -> String {
        self.default.read().clone()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().get(name).cloned()
    }

    /// Pick the provider named in `options`, or the default.
    pub fn resolve(&self, options: &ChatOptions) -> Result<(String, Arc<dyn Provider>)> {
        let requested = options
            .provider_name
            .clone()
            .unwrap_or_else(|| self.default_name());
        match self.get(&requested) {
            Some(provider) => Ok((requested, provider)),
            None => Err(Error::UnknownProvider {
                requested,
                valid: self.names(),
            }),
        }
    }

    /// Validate, call the selected provider with retry, and validate its reply.
    pub async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<ProviderReply> {
        let (name, provider) = self.resolve(options)?;

        for schema in &options.tools {
            if let Err(reason) = schema.validate() {
                let payload = serde_json::to_string(schema).unwrap_or_default();
                error!(provider = %name, %payload, %reason, "invalid tool schema");
                return Err(Error::InvalidToolSchema { reason });
            }
        }

        debug!(provider = %name, messages = messages.len(), tools = options.tools.len(), "provider call");
        let reply = retry_async(|| provider.chat(messages, options), self.retry).await?;

        if let Err(reason) = reply.validate() {
            error!(provider = %name, payload = ?reply, %reason, "invalid provider response");
            return Err(Error::InvalidProviderResponse {
                provider: name,
                reason,
            });
        }
        Ok(reply)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("default", &self.default_name())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EngineResponse, ProviderError, ToolSchema};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        reply: ProviderReply,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(reply: ProviderReply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _options: &ChatOptions,
        ) -> std::result::Result<ProviderReply, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn unknown_provider_lists_valid_names_without_calling() {
        let fixed = Fixed::new(EngineResponse::text("hi").into());
        let registry = ProviderRegistry::new("main");
        registry.register("main", fixed.clone());
        registry.register("backup", fixed.clone());

        let options = ChatOptions::default().with_provider("doesnotexist");
        let err = registry.chat(&[Message::user("hi")], &options).await.unwrap_err();
        match err {
            Error::UnknownProvider { requested, valid } => {
                assert_eq!(requested, "doesnotexist");
                assert_eq!(valid, vec!["backup", "main"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_tool_schema_fails_before_call() {
        let fixed = Fixed::new(EngineResponse::text("hi").into());
        let registry = ProviderRegistry::new("main");
        registry.register("main", fixed.clone());

        let options = ChatOptions::default().with_tools(vec![ToolSchema::new("t", "", json!({}))]);
        let err = registry.chat(&[Message::user("hi")], &options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToolSchema { .. }));
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_reply_is_rejected() {
        let registry = ProviderRegistry::new("main");
        registry.register("main", Fixed::new(EngineResponse::text("").into()));
        let err = registry
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProviderResponse { ref provider, .. } if provider == "main"));
    }

    #[tokio::test]
    async fn default_provider_is_used() {
        let registry = ProviderRegistry::new("main");
        registry.register("main", Fixed::new(ProviderReply::Raw("{}".into())));
        let reply = registry
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, ProviderReply::Raw("{}".into()));
    }
}
