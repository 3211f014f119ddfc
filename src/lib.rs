//! Reactive stat graphs for games.
//!
//! A [`Scope`](stats::Scope) holds named stats. Each has a base value,
//! an optional formula over other stats in the same scope, and a stack of
//! modifiers. Reads are lazy: changing anything marks the affected stats
//! dirty, and a stat is only recomputed when someone asks for its value.

pub mod config;
pub mod expression_part;
mod expression_token;
pub mod expressions;
pub mod modifier_stack;
pub mod modifiers;
pub mod prelude;
pub mod schedule;
pub mod stat_addressing;
pub mod stat_definitions;
pub mod stat_error;
pub mod stat_events;
pub mod stat_node;
pub mod stats;
