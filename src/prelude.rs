pub use crate::config::{ScopeConfig, StatCatalog};
pub use crate::expression_part::{BinaryOp, ExpressionPart, Function};
pub use crate::expressions::{EvalError, Expression, ParseError, evaluate, extract_references, validate};
pub use crate::modifier_stack::{Applied, ModifierStack, ModifierTotals};
pub use crate::modifiers::{Condition, Modifier, ModifierDuration, ModifierId, ModifierKind};
pub use crate::schedule::{Expiration, ModifierHandle, TemporalScheduler};
pub use crate::stat_addressing::StatId;
pub use crate::stat_definitions::{StatCategory, StatSchema, ValueKind};
pub use crate::stat_error::{Diagnostic, StatError, StatResult};
pub use crate::stat_events::{StatChanged, SubscriptionId};
pub use crate::stat_node::StatNode;
pub use crate::stats::Scope;
