//! Data model shared by the archive, guard and engine
//!
//! - **rule**: `Rule`, `GuardRule`, `Reference` and their enums
//! - **trace**: `Critique`, `TraceIteration`, `ComplianceTrace`
//! - **identity**: the optional caller identity used for guard exemptions

mod identity;
mod rule;
mod trace;

pub use identity::Identity;
pub use rule::{GuardRule, Reference, Rule, RuleCategory, Severity};
pub use trace::{ComplianceTrace, Critique, TraceIteration, TraceStatus};
