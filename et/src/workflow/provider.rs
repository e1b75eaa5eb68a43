//! Feature-branch providers
//!
//! A provider turns external input (a ticket id, a typed-in name) into a
//! [`FeatureBranch`]. Providers are resolved once at construction and
//! re-resolved on an explicit refresh; there is no runtime discovery
//! beyond the injected factory.

use std::sync::{Arc, Mutex};

use eyre::{Result, bail};
use tracing::debug;

use crate::domain::FeatureBranch;

/// Named source of feature branches.
pub trait FeatureBranchProvider: Send + Sync {
    fn name(&self) -> &str;

    fn display_name(&self) -> String;

    /// Turn raw input into a feature branch, validating it first.
    fn resolve(&self, input: &str) -> Result<FeatureBranch>;
}

/// Built-in provider for manually entered feature names. Names become
/// environment-scoped branches.
pub struct ManualProvider;

impl FeatureBranchProvider for ManualProvider {
    fn name(&self) -> &str {
        "manual"
    }

    fn display_name(&self) -> String {
        "Manual entry".into()
    }

    fn resolve(&self, input: &str) -> Result<FeatureBranch> {
        let name = input.trim();
        if name.is_empty() {
            bail!("feature branch name must not be empty");
        }
        if name.chars().any(char::is_whitespace) {
            bail!("feature branch name '{}' must not contain whitespace", name);
        }
        if name.starts_with('/') || name.ends_with('/') || name.contains("..") {
            bail!("feature branch name '{}' is not a valid ref segment", name);
        }
        Ok(FeatureBranch::scoped(name))
    }
}

type ProviderFactory = Box<dyn Fn() -> Vec<Arc<dyn FeatureBranchProvider>> + Send + Sync>;

/// Registry of providers, resolved once from the injected factory and
/// re-resolved on [`ProviderRegistry::refresh`].
pub struct ProviderRegistry {
    factory: ProviderFactory,
    providers: Mutex<Vec<Arc<dyn FeatureBranchProvider>>>,
}

impl ProviderRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn FeatureBranchProvider>> + Send + Sync + 'static,
    {
        let providers = factory();
        debug!(count = providers.len(), "resolved feature branch providers");
        Self {
            factory: Box::new(factory),
            providers: Mutex::new(providers),
        }
    }

    /// Registry with only the built-in manual provider.
    pub fn builtin() -> Self {
        Self::new(|| vec![Arc::new(ManualProvider) as Arc<dyn FeatureBranchProvider>])
    }

    pub fn refresh(&self) {
        let providers = (self.factory)();
        debug!(count = providers.len(), "re-resolved feature branch providers");
        *self.providers.lock().expect("registry mutex poisoned") = providers;
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FeatureBranchProvider>> {
        self.providers
            .lock()
            .expect("registry mutex poisoned")
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn FeatureBranchProvider>> {
        self.providers.lock().expect("registry mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_provider_scopes_names() {
        let provider = ManualProvider;
        let feature = provider.resolve("T-100").unwrap();
        assert_eq!(feature, FeatureBranch::scoped("T-100"));
    }

    #[test]
    fn test_manual_provider_rejects_bad_names() {
        let provider = ManualProvider;
        assert!(provider.resolve("").is_err());
        assert!(provider.resolve("has space").is_err());
        assert!(provider.resolve("/leading").is_err());
        assert!(provider.resolve("a..b").is_err());
    }

    #[test]
    fn test_registry_resolves_once_and_refreshes() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ProviderRegistry::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![Arc::new(ManualProvider) as Arc<dyn FeatureBranchProvider>]
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.get("manual").is_some());
        assert!(registry.get("tickets").is_none());

        registry.refresh();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
