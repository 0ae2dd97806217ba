//! Source/target comparison: property equality, linking and filter conditions.

mod condition;
mod engine;
mod link;
mod object;
mod properties;

pub use condition::{Condition, ConditionSide, FilterContext};
pub use engine::ComparisonEngine;
pub use link::link_sources_and_targets;
pub use object::{FetchedObject, ObjectRole};
pub use properties::{build_multi_key, stringify_scalars, values_equal, PropertiesArg};
