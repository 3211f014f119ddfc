use std::collections::HashSet;
use std::rc::Rc;

use crate::expressions::{Expression, ParseError};
use crate::modifier_stack::ModifierStack;
use crate::modifiers::Modifier;
use crate::stat_addressing::StatId;
use crate::stat_definitions::StatSchema;
use crate::stat_events::Subscriber;

/// A stat's formula as the scope holds it.
#[derive(Debug, Clone)]
pub(crate) enum Formula {
    Compiled(Rc<Expression>),
    /// Kept so a broken asset still shows up in diagnostics on every recompute.
    Invalid { definition: String, error: ParseError },
}

impl Formula {
    pub fn parse(definition: &str) -> Self {
        match Expression::new(definition) {
            Ok(expression) => Formula::Compiled(Rc::new(expression)),
            Err(error) => Formula::Invalid { definition: definition.to_string(), error },
        }
    }

    pub fn definition(&self) -> &str {
        match self {
            Formula::Compiled(expression) => expression.definition(),
            Formula::Invalid { definition, .. } => definition,
        }
    }
}

/// One stat: its schema, stored base value, modifiers and cached result.
///
/// Nodes live inside a [`Scope`](crate::stats::Scope), which is the only way
/// to mutate them or read their computed value. This type exposes read-only
/// inspection for tooling.
#[derive(Debug)]
pub struct StatNode {
    pub(crate) id: StatId,
    pub(crate) schema: StatSchema,
    pub(crate) base_value: f64,
    pub(crate) cached_value: f64,
    pub(crate) dirty: bool,
    pub(crate) evaluating: bool,
    pub(crate) overridden: bool,
    pub(crate) modifiers: ModifierStack,
    pub(crate) formula: Option<Formula>,
    /// Formula-only contribution from the last recompute.
    pub(crate) formula_cache: Option<f64>,
    /// Stats this node's formula resolved to.
    pub(crate) dependencies: HashSet<StatId>,
    pub(crate) subscribers: Vec<Subscriber>,
    pub(crate) recomputations: u64,
}

impl StatNode {
    pub(crate) fn new(id: StatId, schema: &StatSchema, initial: Option<f64>) -> Self {
        let base_value = schema.clamp(initial.unwrap_or(schema.default_value));
        Self {
            id,
            schema: schema.clone(),
            base_value,
            cached_value: base_value,
            dirty: true,
            evaluating: false,
            overridden: false,
            modifiers: ModifierStack::new(),
            formula: schema.formula.as_deref().map(Formula::parse),
            formula_cache: None,
            dependencies: HashSet::new(),
            subscribers: Vec::new(),
            recomputations: 0,
        }
    }

    pub fn id(&self) -> StatId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn short_name(&self) -> &str {
        &self.schema.short_name
    }

    pub fn schema(&self) -> &StatSchema {
        &self.schema
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    /// The last computed value. Only meaningful while [`is_dirty`](Self::is_dirty) is `false`.
    pub fn cached_value(&self) -> f64 {
        self.cached_value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the last recompute was decided by an override modifier.
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_ref().map(Formula::definition)
    }

    /// The formula's own contribution at the last recompute, before modifiers.
    pub fn formula_value(&self) -> Option<f64> {
        self.formula_cache
    }

    pub fn modifiers(&self) -> &[Modifier] {
        self.modifiers.as_slice()
    }

    pub fn dependencies(&self) -> impl Iterator<Item = StatId> + '_ {
        self.dependencies.iter().copied()
    }

    /// How many times this stat has been recomputed since creation.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Stores a clamped base value. Returns `false` when nothing changed.
    pub(crate) fn store_base(&mut self, value: f64) -> bool {
        let clamped = self.schema.clamp(value);
        if clamped == self.base_value {
            return false;
        }
        self.base_value = clamped;
        true
    }

    /// Marks the node stale. Returns `false` if it already was.
    pub(crate) fn invalidate(&mut self) -> bool {
        if self.dirty {
            return false;
        }
        self.dirty = true;
        self.formula_cache = None;
        true
    }
}
