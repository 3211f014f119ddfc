use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::config::ScopeConfig;
use crate::expressions::{EvalError, Expression, extract_references};
use crate::modifiers::{Modifier, ModifierDuration, ModifierId};
use crate::schedule::{Expiration, ModifierHandle, TemporalScheduler};
use crate::stat_addressing::{StatArena, StatId};
use crate::stat_definitions::StatSchema;
use crate::stat_error::{Diagnostic, StatError, StatResult};
use crate::stat_events::{DiagnosticLog, StatChanged, Subscriber, SubscriptionId};
use crate::stat_node::{Formula, StatNode};

/// A named collection of stats that resolve each other's formulas.
///
/// The scope owns its stats, the dependency graph between them and the
/// scheduler for their timed modifiers. Values are pulled: mutations only mark
/// stats (and everything depending on them) dirty, and [`value`](Scope::value)
/// recomputes on demand.
///
/// ```
/// use stat_gauge::prelude::*;
///
/// let mut scope = Scope::new("hero");
/// let con = scope.create_stat(&StatSchema::new("Constitution").with_short_name("CON"), Some(10.0)).unwrap();
/// let lvl = scope.create_stat(&StatSchema::new("Level").with_short_name("LVL"), Some(1.0)).unwrap();
/// let hp = scope
///     .create_stat(&StatSchema::new("Health").with_short_name("HP").with_formula("CON * 12 + LVL * 15"), None)
///     .unwrap();
///
/// assert_eq!(scope.value(hp).unwrap(), 150.0);
/// scope.set_base_value(con, 18.0).unwrap();
/// assert_eq!(scope.value(hp).unwrap(), 231.0);
/// # let _ = lvl;
/// ```
pub struct Scope {
    name: String,
    config: ScopeConfig,
    nodes: StatArena<StatNode>,
    /// Lower-cased display names and short names.
    names: HashMap<String, StatId>,
    /// Reverse edges: `a -> {b}` when `b`'s formula reads `a`.
    dependents: HashMap<StatId, HashSet<StatId>>,
    /// Formula references to stats that don't exist yet, by lower-cased name.
    pending: HashMap<String, HashSet<StatId>>,
    scheduler: TemporalScheduler,
    next_modifier: u64,
    next_subscription: u64,
    changes: Vec<StatChanged>,
    diagnostics: DiagnosticLog,
    /// Stats whose cycle was already reported during the current read.
    cycles_reported: HashSet<StatId>,
    /// Stats on which a cycle closed and whose formula result must be discarded.
    cycles_open: HashSet<StatId>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ScopeConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: ScopeConfig) -> Self {
        let diagnostics = DiagnosticLog::new(config.diagnostics_capacity, config.log_diagnostics);
        Self {
            name: name.into(),
            config,
            nodes: StatArena::new(),
            names: HashMap::new(),
            dependents: HashMap::new(),
            pending: HashMap::new(),
            scheduler: TemporalScheduler::new(),
            next_modifier: 1,
            next_subscription: 1,
            changes: Vec::new(),
            diagnostics,
            cycles_reported: HashSet::new(),
            cycles_open: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------------

    /// Instantiates a stat from its schema.
    ///
    /// The base value starts at `initial` (or the schema default), clamped to
    /// the schema bounds. The formula, if any, is parsed and wired into the
    /// dependency graph; a formula that fails to parse is kept and reported as
    /// a diagnostic on every recompute.
    pub fn create_stat(&mut self, schema: &StatSchema, initial: Option<f64>) -> StatResult<StatId> {
        let keys = name_keys(schema);
        if keys.is_empty() {
            return Err(StatError::EmptyName);
        }
        if let Some(taken) = keys.iter().find(|key| self.names.contains_key(*key)) {
            return Err(StatError::DuplicateStat { name: taken.clone() });
        }

        let id = self.nodes.insert_with(|id| StatNode::new(id, schema, initial));
        for key in &keys {
            self.names.insert(key.clone(), id);
        }
        debug!("[{}] created stat '{}' as {}", self.name, schema.name, id);

        self.wire_formula(id);

        // Anything that was waiting on one of our names can resolve now.
        for key in &keys {
            let Some(waiting) = self.pending.remove(key) else { continue };
            for dependent in waiting {
                if !self.nodes.contains(dependent) {
                    continue;
                }
                self.add_edge(id, dependent);
                debug!("[{}] resolved pending reference '{}' for {}", self.name, key, dependent);
                self.invalidate(dependent);
            }
        }

        Ok(id)
    }

    /// Removes a stat.
    ///
    /// Its scheduled modifiers are cancelled first. Stats whose formulas read it
    /// go back to treating the reference as unresolved (`0`) until a stat with
    /// that name is created again.
    pub fn remove_stat(&mut self, id: StatId) -> StatResult<StatSchema> {
        if !self.nodes.contains(id) {
            return Err(StatError::StaleHandle(id));
        }

        let cancelled = self.scheduler.cancel_stat(id);
        if cancelled > 0 {
            debug!("[{}] cancelled {} scheduled modifier(s) of {}", self.name, cancelled, id);
        }

        self.unwire_formula(id);

        let keys = self.nodes.get(id).map(|node| name_keys(&node.schema)).unwrap_or_default();
        for dependent in self.dependents.remove(&id).unwrap_or_default() {
            if dependent == id {
                continue;
            }
            let Some(node) = self.nodes.get_mut(dependent) else { continue };
            node.dependencies.remove(&id);
            let references = formula_references(node);
            for key in keys.iter().filter(|key| references.contains(*key)) {
                self.pending.entry(key.clone()).or_default().insert(dependent);
            }
            self.invalidate(dependent);
        }

        for key in &keys {
            self.names.remove(key);
        }

        let node = self.nodes.remove(id).ok_or(StatError::StaleHandle(id))?;
        debug!("[{}] removed stat '{}'", self.name, node.schema.name);
        Ok(node.schema)
    }

    /// Replaces a stat's formula, or removes it with `None`.
    ///
    /// Unlike [`create_stat`](Scope::create_stat) this is strict: a formula
    /// that doesn't parse is rejected and the old one stays in place.
    pub fn set_formula(&mut self, id: StatId, formula: Option<&str>) -> StatResult<()> {
        if !self.nodes.contains(id) {
            return Err(StatError::StaleHandle(id));
        }
        let compiled = match formula {
            Some(source) => Some(Expression::new(source).map_err(|source_error| StatError::Formula {
                formula: source.to_string(),
                source: source_error,
            })?),
            None => None,
        };

        self.unwire_formula(id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.schema.formula = formula.map(str::to_string);
            node.formula = compiled.map(|expression| Formula::Compiled(expression.into()));
        }
        self.wire_formula(id);
        self.invalidate(id);
        Ok(())
    }

    /// Looks a stat up by display name or short name, ignoring case.
    pub fn get(&self, name: &str) -> Option<StatId> {
        self.names.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn node(&self, id: StatId) -> Option<&StatNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: StatId) -> bool {
        self.nodes.contains(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatId, &StatNode)> {
        self.nodes.iter()
    }

    /// Stats whose formulas read `id`.
    pub fn dependents_of(&self, id: StatId) -> Vec<StatId> {
        self.dependents.get(&id).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    /// Stats that `id`'s formula reads.
    pub fn dependencies_of(&self, id: StatId) -> Vec<StatId> {
        self.nodes.get(id).map(|node| node.dependencies().collect()).unwrap_or_default()
    }

    /// Names that formulas reference but no stat in the scope answers to yet.
    pub fn unresolved_references(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    // ---------------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------------

    pub fn base_value(&self, id: StatId) -> StatResult<f64> {
        self.nodes.get(id).map(|node| node.base_value).ok_or(StatError::StaleHandle(id))
    }

    /// Sets the stored base value, clamped to the schema bounds.
    ///
    /// Does nothing if the clamped value equals the current one. Otherwise the
    /// stat and everything depending on it become dirty.
    pub fn set_base_value(&mut self, id: StatId, value: f64) -> StatResult<()> {
        let node = self.nodes.get_mut(id).ok_or(StatError::StaleHandle(id))?;
        if node.store_base(value) {
            self.invalidate(id);
        }
        Ok(())
    }

    /// The stat's current value, recomputing it first if it is dirty.
    pub fn value(&mut self, id: StatId) -> StatResult<f64> {
        if !self.nodes.contains(id) {
            return Err(StatError::StaleHandle(id));
        }
        self.cycles_reported.clear();
        self.cycles_open.clear();
        Ok(self.compute(id))
    }

    pub fn value_of(&mut self, name: &str) -> StatResult<f64> {
        let id = self.get(name).ok_or_else(|| StatError::StatNotFound { name: name.to_string() })?;
        self.value(id)
    }

    pub fn is_dirty(&self, id: StatId) -> StatResult<bool> {
        self.nodes.get(id).map(|node| node.dirty).ok_or(StatError::StaleHandle(id))
    }

    /// Evaluates an ad-hoc formula against the stats of this scope.
    ///
    /// Strict: parse and arithmetic errors come back as `Err`. Unknown names
    /// still read as `0`.
    pub fn evaluate(&mut self, formula: &str) -> Result<f64, EvalError> {
        let expression = Expression::new(formula)?;
        self.cycles_reported.clear();
        self.cycles_open.clear();
        expression.evaluate(|reference| match self.get(reference) {
            Some(target) => self.compute(target),
            None => {
                self.diagnostics.push(Diagnostic::UnresolvedReference {
                    stat: formula.to_string(),
                    reference: reference.to_string(),
                });
                0.0
            }
        })
    }

    // ---------------------------------------------------------------------
    // Modifiers
    // ---------------------------------------------------------------------

    /// Attaches a modifier and returns its id.
    ///
    /// Returns `Ok(None)` without doing anything when the stat's schema does
    /// not allow modifiers. Temporary modifiers are registered with the
    /// scheduler and expire relative to the current scope time.
    pub fn add_modifier(&mut self, id: StatId, mut modifier: Modifier) -> StatResult<Option<ModifierId>> {
        let node = self.nodes.get(id).ok_or(StatError::StaleHandle(id))?;
        if !node.schema.allow_modifiers {
            debug!("[{}] '{}' does not accept modifiers", self.name, node.schema.name);
            return Ok(None);
        }

        let modifier_id = ModifierId(self.next_modifier);
        self.next_modifier += 1;
        modifier.id = modifier_id;
        modifier.owner = Some(id);

        if let ModifierDuration::Temporary { duration, .. } = modifier.duration {
            let handle = ModifierHandle { stat: id, modifier: modifier_id };
            let expires_at = self.scheduler.register(handle, duration);
            modifier.duration = ModifierDuration::Temporary { duration, expires_at };
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.modifiers.push(modifier);
        }
        self.invalidate(id);
        Ok(Some(modifier_id))
    }

    /// Shorthand for an additive modifier that expires after `duration`.
    pub fn add_temporary_bonus(&mut self, id: StatId, value: f64, duration: f64) -> StatResult<Option<ModifierId>> {
        self.add_modifier(id, Modifier::additive(value).temporary(duration))
    }

    pub fn remove_modifier(&mut self, id: StatId, modifier: ModifierId) -> StatResult<Modifier> {
        let node = self.nodes.get_mut(id).ok_or(StatError::StaleHandle(id))?;
        let removed = node
            .modifiers
            .remove(modifier)
            .ok_or(StatError::ModifierNotFound { stat: id, modifier })?;
        self.scheduler.cancel(modifier);
        self.invalidate(id);
        Ok(removed)
    }

    /// Removes every modifier on `id` tagged with `source`. Returns how many were removed.
    pub fn remove_modifiers_by_source(&mut self, id: StatId, source: &str) -> StatResult<usize> {
        let node = self.nodes.get_mut(id).ok_or(StatError::StaleHandle(id))?;
        let removed = node.modifiers.remove_by_source(source);
        Ok(self.after_bulk_removal(id, removed))
    }

    /// Removes every modifier tagged with `source` from every stat in the scope.
    pub fn remove_source(&mut self, source: &str) -> usize {
        let mut total = 0;
        for id in self.nodes.ids() {
            let Some(node) = self.nodes.get_mut(id) else { continue };
            let removed = node.modifiers.remove_by_source(source);
            total += self.after_bulk_removal(id, removed);
        }
        total
    }

    pub fn clear_modifiers(&mut self, id: StatId) -> StatResult<usize> {
        let node = self.nodes.get_mut(id).ok_or(StatError::StaleHandle(id))?;
        let removed = node.modifiers.clear();
        Ok(self.after_bulk_removal(id, removed))
    }

    pub fn modifiers(&self, id: StatId) -> StatResult<&[Modifier]> {
        self.nodes.get(id).map(|node| node.modifiers()).ok_or(StatError::StaleHandle(id))
    }

    /// Polls every conditional modifier now instead of waiting for the owning
    /// stat's next recompute. Returns how many were removed.
    pub fn prune_conditional_modifiers(&mut self) -> usize {
        let mut total = 0;
        for id in self.nodes.ids() {
            let Some(node) = self.nodes.get_mut(id) else { continue };
            let removed = node.modifiers.prune_conditions();
            total += self.after_bulk_removal(id, removed);
        }
        total
    }

    fn after_bulk_removal(&mut self, id: StatId, removed: Vec<Modifier>) -> usize {
        if removed.is_empty() {
            return 0;
        }
        for modifier in &removed {
            if modifier.duration.is_temporary() {
                self.scheduler.cancel(modifier.id);
            }
        }
        self.invalidate(id);
        removed.len()
    }

    // ---------------------------------------------------------------------
    // Time
    // ---------------------------------------------------------------------

    /// Advances scope time by `delta_time` and expires due modifiers.
    ///
    /// Each stat that lost modifiers is invalidated once, however many of its
    /// modifiers expired. Nothing is recomputed here.
    pub fn tick(&mut self, delta_time: f64) -> Vec<Expiration> {
        let expired = self.scheduler.tick(delta_time);
        for expiration in &expired {
            let Some(node) = self.nodes.get_mut(expiration.stat) else { continue };
            for modifier in &expiration.modifiers {
                node.modifiers.remove(*modifier);
            }
            debug!(
                "[{}] {} modifier(s) expired on '{}' at t={}",
                self.name,
                expiration.modifiers.len(),
                node.schema.name,
                self.scheduler.now()
            );
            self.invalidate(expiration.stat);
        }
        expired
    }

    /// Current scope time.
    pub fn time(&self) -> f64 {
        self.scheduler.now()
    }

    pub fn scheduler(&self) -> &TemporalScheduler {
        &self.scheduler
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    /// Calls `on_change(old, new)` whenever a recompute changes the stat's value.
    ///
    /// Values are pulled, so nothing fires at mutation time: after
    /// `set_base_value` on a dependency, the subscriber hears about the new
    /// value once something reads this stat (or a stat depending on it).
    pub fn subscribe(&mut self, id: StatId, on_change: impl FnMut(f64, f64) + 'static) -> StatResult<SubscriptionId> {
        let node = self.nodes.get_mut(id).ok_or(StatError::StaleHandle(id))?;
        let subscription = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        node.subscribers.push(Subscriber { id: subscription, on_change: Box::new(on_change) });
        Ok(subscription)
    }

    pub fn unsubscribe(&mut self, id: StatId, subscription: SubscriptionId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else { return false };
        let before = node.subscribers.len();
        node.subscribers.retain(|s| s.id != subscription);
        node.subscribers.len() != before
    }

    /// Value changes observed since the last drain, in the order they were computed.
    pub fn drain_changes(&mut self) -> Vec<StatChanged> {
        std::mem::take(&mut self.changes)
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn add_edge(&mut self, source: StatId, dependent: StatId) {
        self.dependents.entry(source).or_default().insert(dependent);
        if let Some(node) = self.nodes.get_mut(dependent) {
            node.dependencies.insert(source);
        }
    }

    /// Registers edges (or pending references) for every name `id`'s formula reads.
    fn wire_formula(&mut self, id: StatId) {
        let Some(node) = self.nodes.get(id) else { return };
        for reference in formula_references(node) {
            match self.names.get(&reference).copied() {
                Some(source) => self.add_edge(source, id),
                None => {
                    debug!("[{}] '{}' waits for unknown stat '{}'", self.name, node_name(&self.nodes, id), reference);
                    self.pending.entry(reference).or_default().insert(id);
                }
            }
        }
    }

    fn unwire_formula(&mut self, id: StatId) {
        let Some(node) = self.nodes.get_mut(id) else { return };
        for source in std::mem::take(&mut node.dependencies) {
            if let Some(set) = self.dependents.get_mut(&source) {
                set.remove(&id);
                if set.is_empty() {
                    self.dependents.remove(&source);
                }
            }
        }
        self.pending.retain(|_, waiting| {
            waiting.remove(&id);
            !waiting.is_empty()
        });
    }

    /// Marks `id` dirty and walks its dependents.
    fn invalidate(&mut self, id: StatId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.invalidate();
        }
        self.notify_changed(id);
    }

    /// Marks every transitive dependent of `id` dirty, stopping at stats that
    /// already are. `id` itself is never re-dirtied when a cycle leads back to it.
    fn notify_changed(&mut self, id: StatId) {
        let mut stack: Vec<StatId> = match self.dependents.get(&id) {
            Some(set) => set.iter().copied().collect(),
            None => return,
        };
        while let Some(next) = stack.pop() {
            if next == id {
                continue;
            }
            let Some(node) = self.nodes.get_mut(next) else { continue };
            if !node.invalidate() {
                continue;
            }
            if let Some(set) = self.dependents.get(&next) {
                stack.extend(set.iter().copied());
            }
        }
    }

    fn report(&mut self, id: StatId, make: impl FnOnce(String) -> Diagnostic) {
        let stat = node_name(&self.nodes, id).to_string();
        self.diagnostics.push(make(stat));
    }

    fn resolve_reference(&mut self, from: StatId, reference: &str) -> f64 {
        match self.get(reference) {
            Some(target) => self.compute(target),
            None => {
                self.report(from, |stat| Diagnostic::UnresolvedReference { stat, reference: reference.to_string() });
                0.0
            }
        }
    }

    /// Recomputes `id` if it is dirty and returns its value.
    fn compute(&mut self, id: StatId) -> f64 {
        let Some(node) = self.nodes.get_mut(id) else { return 0.0 };
        if !node.dirty {
            return node.cached_value;
        }

        if node.evaluating {
            // Re-entered through a cycle: hand the reader our base value and
            // make the outer evaluation of this stat drop its formula result.
            let base = node.base_value;
            self.cycles_open.insert(id);
            if self.cycles_reported.insert(id) {
                self.report(id, |stat| Diagnostic::CircularFormula { stat });
            }
            return base;
        }

        node.evaluating = true;
        let base = node.base_value;
        let formula = node.formula.clone();
        let pruned = node.modifiers.prune_conditions();
        if !pruned.is_empty() {
            debug!("[{}] {} conditional modifier(s) lapsed on '{}'", self.name, pruned.len(), node.schema.name);
        }

        let formula_value = match formula {
            None => None,
            Some(Formula::Compiled(expression)) => {
                match expression.evaluate(|reference| self.resolve_reference(id, reference)) {
                    Ok(value) => Some(value),
                    Err(error) => {
                        self.report(id, |stat| Diagnostic::FormulaError { stat, error });
                        Some(0.0)
                    }
                }
            }
            Some(Formula::Invalid { error, .. }) => {
                self.report(id, |stat| Diagnostic::FormulaError { stat, error: EvalError::Parse(error) });
                Some(0.0)
            }
        };
        let formula_value = if self.cycles_open.remove(&id) { formula_value.map(|_| 0.0) } else { formula_value };

        let Some(node) = self.nodes.get_mut(id) else { return 0.0 };
        let applied = node.modifiers.apply(base + formula_value.unwrap_or(0.0), base);
        let value = if applied.overridden { applied.value } else { node.schema.clamp(applied.value) };

        let old = node.cached_value;
        node.cached_value = value;
        node.formula_cache = formula_value;
        node.overridden = applied.overridden;
        node.evaluating = false;
        node.dirty = false;
        node.recomputations += 1;

        let changed = old != value && !(old.is_nan() && value.is_nan());
        if changed {
            let mut subscribers = std::mem::take(&mut node.subscribers);
            for subscriber in subscribers.iter_mut() {
                (subscriber.on_change)(old, value);
            }
            node.subscribers = subscribers;
            // Dependents were already dirtied by the mutation that dirtied us.
            self.changes.push(StatChanged { stat: id, old, new: value });
        }
        value
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        // Fields would drop `nodes` first. Clearing here only makes the
        // timers-before-stats teardown order explicit.
        self.scheduler.clear();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("stats", &self.nodes.len())
            .field("time", &self.scheduler.now())
            .field("scheduled", &self.scheduler.len())
            .finish()
    }
}

/// Lower-cased keys a schema answers to, display name first.
fn name_keys(schema: &StatSchema) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    let name = schema.name.trim().to_ascii_lowercase();
    if !name.is_empty() {
        keys.push(name);
    }
    let short = schema.short_name.trim().to_ascii_lowercase();
    if !short.is_empty() && !keys.contains(&short) {
        keys.push(short);
    }
    keys
}

fn formula_references(node: &StatNode) -> BTreeSet<String> {
    match &node.formula {
        Some(Formula::Compiled(expression)) => expression.references().clone(),
        Some(Formula::Invalid { definition, .. }) => extract_references(definition),
        None => BTreeSet::new(),
    }
}

fn node_name(nodes: &StatArena<StatNode>, id: StatId) -> &str {
    nodes.get(id).map(|node| node.schema.name.as_str()).unwrap_or("<removed>")
}
