use serde::{Deserialize, Serialize};

use crate::prelude::*;

fn default_diagnostics_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

/// Tunables for a [`Scope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// How many diagnostics the scope keeps before dropping the oldest.
    #[serde(default = "default_diagnostics_capacity")]
    pub diagnostics_capacity: usize,
    /// Forward diagnostics to `log::warn!` as they happen.
    #[serde(default = "default_true")]
    pub log_diagnostics: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { diagnostics_capacity: default_diagnostics_capacity(), log_diagnostics: true }
    }
}

/// An ordered set of stat schemas, usually deserialized from an asset.
///
/// ```
/// use stat_gauge::prelude::*;
///
/// let catalog = StatCatalog::new()
///     .with(StatSchema::new("Constitution").with_short_name("CON").with_default(10.0))
///     .with(StatSchema::new("Health").with_short_name("HP").with_formula("CON * 12"));
///
/// let mut scope = Scope::new("hero");
/// let ids = catalog.instantiate(&mut scope).unwrap();
/// assert_eq!(scope.value(ids[1]).unwrap(), 120.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatCatalog {
    #[serde(default)]
    pub stats: Vec<StatSchema>,
}

impl StatCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, schema: StatSchema) -> Self {
        self.stats.push(schema);
        self
    }

    pub fn push(&mut self, schema: StatSchema) {
        self.stats.push(schema);
    }

    pub fn get(&self, name: &str) -> Option<&StatSchema> {
        self.stats.iter().find(|schema| {
            schema.name.eq_ignore_ascii_case(name)
                || (!schema.short_name.is_empty() && schema.short_name.eq_ignore_ascii_case(name))
        })
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Creates every stat in the catalog, in order, at its default value.
    ///
    /// Order does not matter for formulas: references to stats created later
    /// are wired up when those stats appear.
    pub fn instantiate(&self, scope: &mut Scope) -> StatResult<Vec<StatId>> {
        self.stats.iter().map(|schema| scope.create_stat(schema, None)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScopeConfig::default();
        assert_eq!(config.diagnostics_capacity, 256);
        assert!(config.log_diagnostics);
    }

    #[test]
    fn test_catalog_lookup_by_either_name() {
        let catalog = StatCatalog::new().with(StatSchema::new("Strength").with_short_name("STR"));
        assert!(catalog.get("strength").is_some());
        assert!(catalog.get("str").is_some());
        assert!(catalog.get("").is_none());
        assert!(catalog.get("dex").is_none());
    }

    #[test]
    fn test_instantiate_fails_on_duplicates() {
        let catalog = StatCatalog::new()
            .with(StatSchema::new("Strength"))
            .with(StatSchema::new("STRENGTH"));
        let mut scope = Scope::new("test");
        assert!(matches!(catalog.instantiate(&mut scope), Err(StatError::DuplicateStat { .. })));
    }
}
