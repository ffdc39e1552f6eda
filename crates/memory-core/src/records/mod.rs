//! Row model for both schema layouts and the rewrites between them.

pub mod current;
pub mod legacy;
mod transform;

pub use current::{
    ActiveWork, Constraint, CurrentFamily, CurrentRecord, Decision, DecisionKind,
    DecisionReasoning, Goal, Note, Problem, ProblemStatus, WorkStatus,
};
pub use legacy::{read_family, LegacyFamily, LegacyRecord};
pub use transform::{confidence_band, parse_list, parse_timestamp, slugify};
