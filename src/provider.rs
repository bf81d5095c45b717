//! Provider registry for the `chirp run` subcommand.
//!
//! A provider is a pluggable component with a single `run(model)` entry
//! point, resolved by name at invocation time. Resolution goes through
//! an explicit registry (name -> factory) populated at startup; there
//! is no directory scanning or dynamic loading, so a name either maps
//! to exactly one factory or fails loudly.

use crate::error::{ChirpError, Result};
use std::collections::BTreeMap;

/// Default provider when `--provider` is not given.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// Default model when `--model` is not given.
pub const DEFAULT_MODEL: &str = "gemini-2.5";

/// Credentials and defaults a factory may need to build its provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    pub api_key: Option<String>,
}

/// A pluggable backend with a single entry point.
pub trait Provider {
    /// Stable provider name (matches its registry key).
    fn name(&self) -> &str;

    /// Base URL of the backing API.
    fn base_url(&self) -> &str;

    /// Dispatch one call. Must return a deterministic, non-empty string
    /// for a fixed configuration and model.
    ///
    /// # Errors
    ///
    /// Provider-specific failures propagate with the provider's message.
    fn run(&self, model: Option<&str>) -> Result<String>;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").field("name", &self.name()).finish()
    }
}

type Factory = Box<dyn Fn(&ProviderContext) -> Result<Box<dyn Provider>> + Send + Sync>;

/// Name -> factory mapping. Registration is explicit; `resolve` is a
/// map lookup followed by one factory call.
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Factory>,
}

impl ProviderRegistry {
    /// An empty registry (tests add their own entries).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The registry with all built-in providers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("openrouter", |ctx| {
            Ok(Box::new(OpenRouterProvider::new(ctx)?))
        });
        registry
    }

    /// Register a factory under a name. A later registration under the
    /// same name replaces the earlier one.
    pub fn register<F>(&mut self, name: &'static str, factory: F)
    where
        F: Fn(&ProviderContext) -> Result<Box<dyn Provider>> + Send + Sync + 'static,
    {
        self.factories.insert(name, Box::new(factory));
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Resolve a name to a constructed provider.
    ///
    /// # Errors
    ///
    /// `ProviderNotFound` if no factory is registered under `name`;
    /// `ProviderLoad` if the factory fails (e.g. missing credential).
    pub fn resolve(&self, name: &str, ctx: &ProviderContext) -> Result<Box<dyn Provider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ChirpError::ProviderNotFound {
                name: name.to_string(),
                known: self.names().iter().map(ToString::to_string).collect(),
            })?;
        factory(ctx)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// The OpenRouter API wrapper.
///
/// The actual client is a stub: `run` formats a deterministic summary
/// of the dispatch instead of performing a network call.
pub struct OpenRouterProvider {
    api_key: String,
}

impl OpenRouterProvider {
    /// # Errors
    ///
    /// `ProviderLoad` when no API key is available.
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        let api_key = ctx
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ChirpError::provider_load("openrouter", "no API key configured"))?;
        Ok(Self { api_key })
    }
}

impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn base_url(&self) -> &str {
        "https://openrouter.ai/api/v1"
    }

    fn run(&self, model: Option<&str>) -> Result<String> {
        Ok(format!(
            "Provider: {}, Base URL: {}, API Key: {}, Model: {}",
            self.name(),
            self.base_url(),
            mask_key(&self.api_key),
            model.unwrap_or(DEFAULT_MODEL),
        ))
    }
}

/// Mask a credential down to its last four characters for display.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProviderContext {
        ProviderContext {
            api_key: Some("sk-test-1234".to_string()),
        }
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry.resolve("nonexistent", &ctx()).unwrap_err();
        assert!(matches!(err, ChirpError::ProviderNotFound { .. }));
        assert!(err.to_string().contains("openrouter"));
    }

    #[test]
    fn resolve_builtin_and_run() {
        let registry = ProviderRegistry::with_builtins();
        let provider = registry.resolve("openrouter", &ctx()).unwrap();

        let output = provider.run(Some("gpt-4o")).unwrap();
        assert!(!output.is_empty());
        assert!(output.contains("openrouter"));
        assert!(output.contains("https://openrouter.ai/api/v1"));
        assert!(output.contains("gpt-4o"));
        // The raw key must not appear in output.
        assert!(!output.contains("sk-test-1234"));
        assert!(output.contains("1234"));
    }

    #[test]
    fn run_is_deterministic() {
        let registry = ProviderRegistry::with_builtins();
        let provider = registry.resolve("openrouter", &ctx()).unwrap();
        assert_eq!(
            provider.run(Some("m")).unwrap(),
            provider.run(Some("m")).unwrap()
        );
    }

    #[test]
    fn run_without_model_uses_default() {
        let registry = ProviderRegistry::with_builtins();
        let provider = registry.resolve("openrouter", &ctx()).unwrap();
        assert!(provider.run(None).unwrap().contains(DEFAULT_MODEL));
    }

    #[test]
    fn missing_api_key_is_load_error() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry
            .resolve("openrouter", &ProviderContext::default())
            .unwrap_err();
        assert!(matches!(err, ChirpError::ProviderLoad { .. }));
    }

    #[test]
    fn custom_registration_is_resolvable() {
        struct Echo;
        impl Provider for Echo {
            fn name(&self) -> &str {
                "echo"
            }
            fn base_url(&self) -> &str {
                "http://localhost"
            }
            fn run(&self, model: Option<&str>) -> Result<String> {
                Ok(format!("echo {}", model.unwrap_or("-")))
            }
        }

        let mut registry = ProviderRegistry::empty();
        registry.register("echo", |_| Ok(Box::new(Echo)));
        assert_eq!(registry.names(), vec!["echo"]);

        let provider = registry.resolve("echo", &ProviderContext::default()).unwrap();
        assert_eq!(provider.run(Some("m")).unwrap(), "echo m");
    }

    #[test]
    fn mask_key_keeps_last_four() {
        assert_eq!(mask_key("abcd"), "****");
        assert_eq!(mask_key("sk-12345"), "****2345");
    }
}
