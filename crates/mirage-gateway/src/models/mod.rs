//! Domain types shared across the gateway.
//!
//! Everything here serializes with camelCase field names, which is the wire
//! format of both the admin API and the file store.

mod condition;
mod operation;
mod rule;
mod spec;
mod stats;
mod trace;

pub use condition::{Condition, ConditionOperator, ConditionSource};
pub use operation::{ExampleResponse, Operation, OperationSummary};
pub use rule::{ResponseRule, ResponseRuleInput, ResponseRuleUpdate};
pub use spec::{Spec, SpecInput, SpecUpdate};
pub use stats::{ErrorStat, GlobalStats, HourlyStat, OperationStat, SpecStats};
pub use trace::{Trace, TraceFilter, TraceRequest, TraceResponse};
