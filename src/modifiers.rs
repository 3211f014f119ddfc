use std::fmt;
use std::rc::Rc;

use crate::stat_addressing::StatId;

/// Identifies a modifier within its scope. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModifierId(pub(crate) u64);

impl ModifierId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a modifier combines with the value it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    /// Adds `value`.
    Additive,
    /// Subtracts `value`.
    Subtractive,
    /// Multiplies by `value`.
    Multiplicative,
    /// Adds `value` percent of the stat's base value.
    Percentage,
    /// Replaces the final value outright. Skips clamping.
    Override,
}

/// Predicate polled by a conditional modifier. Returns `true` once the modifier should go away.
#[derive(Clone)]
pub struct Condition(Rc<dyn Fn() -> bool>);

impl Condition {
    pub fn new(should_remove: impl Fn() -> bool + 'static) -> Self {
        Self(Rc::new(should_remove))
    }

    pub fn should_remove(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition(..)")
    }
}

/// How long a modifier lives.
#[derive(Debug, Clone)]
pub enum ModifierDuration {
    Permanent,
    /// Expires `duration` after it was attached. `expires_at` is filled in by the
    /// scheduler on registration and is absolute scope time.
    Temporary { duration: f64, expires_at: f64 },
    /// Removed the first time its condition reports `true` during a recompute.
    Conditional(Condition),
}

impl ModifierDuration {
    pub fn is_temporary(&self) -> bool {
        matches!(self, ModifierDuration::Temporary { .. })
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, ModifierDuration::Conditional(_))
    }
}

/// A permanent, timed or conditional adjustment to a stat.
///
/// Build one with [`Modifier::new`] (or the kind shorthands) and attach it
/// with [`Scope::add_modifier`](crate::stats::Scope::add_modifier):
///
/// ```
/// use stat_gauge::prelude::*;
///
/// let haste = Modifier::multiplicative(1.25)
///     .with_source("potion:haste")
///     .temporary(30.0);
/// assert_eq!(haste.kind(), ModifierKind::Multiplicative);
/// ```
#[derive(Debug, Clone)]
pub struct Modifier {
    pub(crate) id: ModifierId,
    pub(crate) kind: ModifierKind,
    pub(crate) value: f64,
    pub(crate) priority: i32,
    pub(crate) duration: ModifierDuration,
    pub(crate) source: String,
    pub(crate) owner: Option<StatId>,
}

impl Modifier {
    pub fn new(kind: ModifierKind, value: f64) -> Self {
        Self {
            id: ModifierId(0),
            kind,
            value,
            priority: 0,
            duration: ModifierDuration::Permanent,
            source: String::new(),
            owner: None,
        }
    }

    pub fn additive(value: f64) -> Self {
        Self::new(ModifierKind::Additive, value)
    }

    pub fn subtractive(value: f64) -> Self {
        Self::new(ModifierKind::Subtractive, value)
    }

    pub fn multiplicative(value: f64) -> Self {
        Self::new(ModifierKind::Multiplicative, value)
    }

    pub fn percentage(value: f64) -> Self {
        Self::new(ModifierKind::Percentage, value)
    }

    pub fn override_with(value: f64) -> Self {
        Self::new(ModifierKind::Override, value)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Makes the modifier expire `duration` time units after it is attached.
    pub fn temporary(mut self, duration: f64) -> Self {
        self.duration = ModifierDuration::Temporary { duration, expires_at: f64::INFINITY };
        self
    }

    /// Makes the modifier go away once `should_remove` returns `true`.
    pub fn until(mut self, should_remove: impl Fn() -> bool + 'static) -> Self {
        self.duration = ModifierDuration::Conditional(Condition::new(should_remove));
        self
    }

    pub fn id(&self) -> ModifierId {
        self.id
    }

    pub fn kind(&self) -> ModifierKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn duration(&self) -> &ModifierDuration {
        &self.duration
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The stat this modifier is attached to, once attached.
    pub fn owner(&self) -> Option<StatId> {
        self.owner
    }

    /// Absolute scope time at which a temporary modifier expires.
    pub fn expires_at(&self) -> Option<f64> {
        match self.duration {
            ModifierDuration::Temporary { expires_at, .. } => Some(expires_at),
            _ => None,
        }
    }

    /// Time left before expiry at scope time `now`. `None` unless temporary.
    pub fn remaining(&self, now: f64) -> Option<f64> {
        self.expires_at().map(|at| (at - now).max(0.0))
    }

    pub fn should_remove(&self) -> bool {
        match &self.duration {
            ModifierDuration::Conditional(condition) => condition.should_remove(),
            _ => false,
        }
    }
}
