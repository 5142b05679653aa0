//! Process-wide source registry: compiled once from configuration, read-only
//! afterwards. Configuration changes mean loading a new registry and swapping
//! it in whole; nothing mutates a definition in place.

use std::collections::HashMap;

use crate::error::{Outcome, SourceError};
use crate::source::{SourceConfig, SourceDefinition};

/// Source definitions shipped with the crate, distilled from real site
/// layouts. Used when no sources file is configured.
const DEFAULT_SOURCES: &str = include_str!("defaults.json");

/// Ordered, id-indexed set of immutable [SourceDefinition]s. Safe to share
/// across threads without locking once loaded.
#[derive(Debug)]
pub struct Registry {
    sources: Vec<SourceDefinition>,
    by_id: HashMap<String, usize>,
}

impl Registry {
    /// Compile and index the given configurations, preserving their order.
    /// Fails on a duplicate id or any invalid selector chain; a structurally
    /// invalid configuration cannot safely serve any request.
    pub fn load(configs: &[SourceConfig]) -> Outcome<Registry> {
        let mut sources = Vec::with_capacity(configs.len());
        let mut by_id = HashMap::with_capacity(configs.len());
        for config in configs {
            let definition = config.compile()?;
            if by_id.contains_key(&definition.id) {
                return Err(SourceError::DuplicateSourceId {
                    id: definition.id.clone(),
                });
            }
            by_id.insert(definition.id.clone(), sources.len());
            sources.push(definition);
        }
        Ok(Registry { sources, by_id })
    }

    /// Load a registry from a JSON array of source configurations.
    pub fn from_json(json: &str) -> Outcome<Registry> {
        let configs: Vec<SourceConfig> =
            serde_json::from_str(json).map_err(|e| SourceError::InvalidSources {
                reason: e.to_string(),
            })?;
        Registry::load(&configs)
    }

    /// The built-in source set.
    pub fn builtin() -> Outcome<Registry> {
        Registry::from_json(DEFAULT_SOURCES)
    }

    pub fn get(&self, id: &str) -> Option<&SourceDefinition> {
        self.by_id.get(id).map(|&i| &self.sources[i])
    }

    /// Like [get](Registry::get) but failing with `UnknownSourceId`, for
    /// operations addressed to a source by id.
    pub fn require(&self, id: &str) -> Outcome<&SourceDefinition> {
        self.get(id).ok_or_else(|| SourceError::UnknownSourceId {
            id: id.to_string(),
        })
    }

    /// All definitions in insertion order.
    pub fn all(&self) -> &[SourceDefinition] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
