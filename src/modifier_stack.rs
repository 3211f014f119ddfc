use crate::modifiers::{Modifier, ModifierId, ModifierKind};

/// The combined effect of every modifier on a stack.
///
/// Rebuilt only when the stack changes, so repeated reads of a stat never
/// rescan its modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModifierTotals {
    /// Sum of additive values minus sum of subtractive values.
    pub additive: f64,
    /// Sum of percentage values, in percent.
    pub percentage: f64,
    /// Product of multiplicative values.
    pub multiplicative: f64,
    /// Value of the winning override, if any.
    pub override_value: Option<f64>,
}

impl Default for ModifierTotals {
    fn default() -> Self {
        Self { additive: 0.0, percentage: 0.0, multiplicative: 1.0, override_value: None }
    }
}

/// Result of running a value through a stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    pub value: f64,
    /// An override fired; the caller must not clamp `value`.
    pub overridden: bool,
}

impl ModifierTotals {
    pub fn from_modifiers(modifiers: &[Modifier]) -> Self {
        let mut totals = Self::default();
        let mut winner: Option<(i32, usize, f64)> = None;

        for (position, modifier) in modifiers.iter().enumerate() {
            match modifier.kind {
                ModifierKind::Additive => totals.additive += modifier.value,
                ModifierKind::Subtractive => totals.additive -= modifier.value,
                ModifierKind::Percentage => totals.percentage += modifier.value,
                ModifierKind::Multiplicative => totals.multiplicative *= modifier.value,
                ModifierKind::Override => {
                    // Highest priority wins, later additions win ties.
                    let candidate = (modifier.priority, position, modifier.value);
                    if winner.is_none_or(|(p, i, _)| (candidate.0, candidate.1) > (p, i)) {
                        winner = Some(candidate);
                    }
                }
            }
        }

        totals.override_value = winner.map(|(_, _, value)| value);
        totals
    }

    /// Combines `input` (base plus formula) with these totals.
    ///
    /// `result = (input + additive) * multiplicative + base * percentage / 100`.
    /// Percentage bonuses are "of base" and stack additively with each other;
    /// multipliers do not scale them.
    pub fn apply(&self, input: f64, base_value: f64) -> Applied {
        if let Some(value) = self.override_value {
            return Applied { value, overridden: true };
        }
        let percentage_total = base_value * self.percentage / 100.0;
        let value = (input + self.additive) * self.multiplicative + percentage_total;
        Applied { value, overridden: false }
    }
}

/// Ordered list of modifiers on one stat.
#[derive(Debug, Clone, Default)]
pub struct ModifierStack {
    modifiers: Vec<Modifier>,
    snapshot: Option<ModifierTotals>,
}

impl ModifierStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, modifier: Modifier) {
        self.modifiers.push(modifier);
        self.snapshot = None;
    }

    pub fn get(&self, id: ModifierId) -> Option<&Modifier> {
        self.modifiers.iter().find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: ModifierId) -> Option<Modifier> {
        let position = self.modifiers.iter().position(|m| m.id == id)?;
        self.snapshot = None;
        Some(self.modifiers.remove(position))
    }

    /// Removes every modifier matching `predicate`, keeping the order of the rest.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&Modifier) -> bool) -> Vec<Modifier> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.modifiers.len());
        for modifier in self.modifiers.drain(..) {
            if predicate(&modifier) {
                removed.push(modifier);
            } else {
                kept.push(modifier);
            }
        }
        self.modifiers = kept;
        if !removed.is_empty() {
            self.snapshot = None;
        }
        removed
    }

    pub fn remove_by_source(&mut self, source: &str) -> Vec<Modifier> {
        self.remove_where(|m| m.source == source)
    }

    /// Drops conditional modifiers whose condition now says they should go.
    pub fn prune_conditions(&mut self) -> Vec<Modifier> {
        if !self.has_conditionals() {
            return Vec::new();
        }
        self.remove_where(Modifier::should_remove)
    }

    pub fn clear(&mut self) -> Vec<Modifier> {
        self.snapshot = None;
        std::mem::take(&mut self.modifiers)
    }

    pub fn has_conditionals(&self) -> bool {
        self.modifiers.iter().any(|m| m.duration.is_conditional())
    }

    pub fn has_override(&self) -> bool {
        self.modifiers.iter().any(|m| m.kind == ModifierKind::Override)
    }

    pub fn as_slice(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Modifier> {
        self.modifiers.iter()
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    pub fn totals(&mut self) -> ModifierTotals {
        if let Some(totals) = self.snapshot {
            return totals;
        }
        let totals = ModifierTotals::from_modifiers(&self.modifiers);
        self.snapshot = Some(totals);
        totals
    }

    pub fn apply(&mut self, input: f64, base_value: f64) -> Applied {
        self.totals().apply(input, base_value)
    }
}
