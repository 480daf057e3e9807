//! Named-variable resolvers for cache-key patterns.
//!
//! A chain is composed ad hoc per request: the engine-provided special
//! variables first, then the caller-supplied resolver bound to the current
//! unit of work. Resolution is stateless per call.

use std::collections::HashMap;
use std::sync::Arc;

pub trait VariableResolver: Send + Sync {
    /// Resolve one variable, or decline by returning `None`.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Engine-level variables that are always consulted first.
#[derive(Debug, Clone)]
pub struct SpecialVars {
    pub document: String,
    pub application: String,
    pub base_path: String,
}

impl VariableResolver for SpecialVars {
    fn resolve(&self, name: &str) -> Option<String> {
        match name {
            "document" => Some(self.document.clone()),
            "application" => Some(self.application.clone()),
            "base_path" => Some(self.base_path.clone()),
            _ => None,
        }
    }
}

/// Request-bound resolver over a plain variable map.
#[derive(Debug, Default, Clone)]
pub struct MapResolver(HashMap<String, String>);

impl MapResolver {
    pub fn new(variables: HashMap<String, String>) -> Self {
        Self(variables)
    }
}

impl VariableResolver for MapResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Ordered fallback chain. Short-lived; build one per resolution pass.
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn VariableResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, resolver: Arc<dyn VariableResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.resolve(name))
    }

    /// A missing variable resolves to the empty string, never an error.
    /// Callers relying on a variable must ensure a resolver covers it.
    pub fn resolve_or_empty(&self, name: &str) -> String {
        self.resolve(name).unwrap_or_default()
    }
}
