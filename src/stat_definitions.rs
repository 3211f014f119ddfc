use serde::{Deserialize, Serialize};

/// What role a stat plays in the character sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StatCategory {
    /// Set directly (strength, level).
    #[default]
    Primary,
    /// Computed from other stats through a formula.
    Derived,
    /// Driven by something outside the character (difficulty, weather).
    External,
}

/// How a stat's value is meant to be read. Only affects formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueKind {
    #[default]
    Plain,
    Percentage,
    Rate,
}

fn default_min() -> f64 {
    f64::MIN
}

fn default_max() -> f64 {
    f64::MAX
}

fn default_true() -> bool {
    true
}

/// Immutable description of a stat, authored outside the engine.
///
/// A scope copies what it needs when it instantiates the stat, so the caller
/// keeps ownership of its schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSchema {
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub category: StatCategory,
    #[serde(default)]
    pub value_kind: ValueKind,
    #[serde(default)]
    pub default_value: f64,
    #[serde(default = "default_min")]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default)]
    pub formula: Option<String>,
    /// When `false`, modifiers added to this stat are ignored.
    #[serde(default = "default_true")]
    pub allow_modifiers: bool,
}

impl StatSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: String::new(),
            category: StatCategory::Primary,
            value_kind: ValueKind::Plain,
            default_value: 0.0,
            min: f64::MIN,
            max: f64::MAX,
            formula: None,
            allow_modifiers: true,
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    pub fn with_category(mut self, category: StatCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_value_kind(mut self, value_kind: ValueKind) -> Self {
        self.value_kind = value_kind;
        self
    }

    pub fn with_default(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets the formula. Also marks the stat as derived.
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self.category = StatCategory::Derived;
        self
    }

    pub fn locked(mut self) -> Self {
        self.allow_modifiers = false;
        self
    }

    /// Clamps into `[min, max]`. Inverted bounds clamp to `min`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.min(self.max).max(self.min)
    }

    pub fn format_value(&self, value: f64) -> String {
        match self.value_kind {
            ValueKind::Plain => format!("{}", value),
            ValueKind::Percentage => format!("{}%", value),
            ValueKind::Rate => format!("{}/s", value),
        }
    }
}
