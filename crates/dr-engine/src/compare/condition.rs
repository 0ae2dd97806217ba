//! The closed set of filter conditions.

use serde_json::Value;

use super::object::FetchedObject;
use super::properties::PropertiesArg;
use crate::config::{ConditionName, FilterDefinition};
use crate::error::{CompareError, ServiceError};
use crate::model::PropertyMap;
use crate::script::ScriptEvaluator;

/// Which fetched objects a condition is anchored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionSide {
    Source,
    Target,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// No condition configured: every source matches.
    MatchAllSource,
    SourceInTarget(Option<PropertiesArg>),
    SourceNotInTarget(Option<PropertiesArg>),
    SourceMismatchedInTarget(PropertiesArg),
    TargetNotInSource(Option<PropertiesArg>),
    SourceScript(String),
    TargetScript(String),
}

/// Evaluation input for one primary object.
pub struct FilterContext<'a> {
    pub primary: &'a FetchedObject,
    /// Candidate counterparts. Narrowed in place by `SourceInTarget`;
    /// each evaluation gets its own list.
    pub candidates: Vec<&'a PropertyMap>,
    pub inputs: &'a PropertyMap,
    pub feature_pack_id: &'a str,
}

impl Condition {
    pub fn from_definition(filter: &FilterDefinition) -> Result<Self, CompareError> {
        let Some(condition) = &filter.condition else {
            return Ok(Condition::MatchAllSource);
        };
        let arg = condition
            .arg
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        let pairs = || arg.map(PropertiesArg::parse).transpose();
        let required = |name: &str| {
            CompareError::Service(ServiceError::FilterConditionNotSupported(format!(
                "{} requires an arg (filter '{}')",
                name, filter.name
            )))
        };

        Ok(match condition.name {
            ConditionName::SourceInTarget => Condition::SourceInTarget(pairs()?),
            ConditionName::SourceNotInTarget => Condition::SourceNotInTarget(pairs()?),
            ConditionName::SourceMismatchedInTarget => Condition::SourceMismatchedInTarget(
                pairs()?.ok_or_else(|| required("sourceMismatchedInTarget"))?,
            ),
            ConditionName::TargetNotInSource => Condition::TargetNotInSource(pairs()?),
            ConditionName::SourceScript => {
                Condition::SourceScript(arg.ok_or_else(|| required("sourceScript"))?.to_string())
            }
            ConditionName::TargetScript => {
                Condition::TargetScript(arg.ok_or_else(|| required("targetScript"))?.to_string())
            }
        })
    }

    pub fn side(&self) -> ConditionSide {
        match self {
            Condition::TargetNotInSource(_) | Condition::TargetScript(_) => ConditionSide::Target,
            _ => ConditionSide::Source,
        }
    }

    pub fn test(
        &self,
        filter_name: &str,
        ctx: &mut FilterContext<'_>,
        scripts: &dyn ScriptEvaluator,
    ) -> Result<bool, CompareError> {
        let object: &FetchedObject = ctx.primary;
        let primary = &object.properties;
        let linked = object.linked.as_ref().filter(|m| !m.is_empty());

        Ok(match self {
            Condition::MatchAllSource => true,

            Condition::SourceInTarget(None) => linked.is_some(),
            Condition::SourceInTarget(Some(arg)) => match linked {
                Some(target) => arg.all_equal(primary, target),
                None => {
                    ctx.candidates.retain(|target| arg.all_equal(primary, target));
                    !ctx.candidates.is_empty()
                }
            },

            Condition::SourceNotInTarget(None) => linked.is_none(),
            Condition::SourceNotInTarget(Some(arg)) => match linked {
                Some(target) => !arg.all_equal(primary, target),
                None => !ctx
                    .candidates
                    .iter()
                    .any(|target| arg.all_equal(primary, target)),
            },

            Condition::SourceMismatchedInTarget(arg) => match linked {
                Some(target) => arg.any_differs(primary, target),
                None => false,
            },

            // Pairs are declared source:target, the primary here is a target.
            Condition::TargetNotInSource(None) => linked.is_none(),
            Condition::TargetNotInSource(Some(arg)) => match linked {
                Some(source) => !arg.all_equal(source, primary),
                None => !ctx
                    .candidates
                    .iter()
                    .any(|source| arg.all_equal(source, primary)),
            },

            Condition::SourceScript(script) => {
                run_script(script, "source", "targets", filter_name, ctx, scripts)?
            }
            Condition::TargetScript(script) => {
                run_script(script, "target", "sources", filter_name, ctx, scripts)?
            }
        })
    }
}

fn run_script(
    script: &str,
    primary_name: &str,
    candidates_name: &str,
    filter_name: &str,
    ctx: &FilterContext<'_>,
    scripts: &dyn ScriptEvaluator,
) -> Result<bool, CompareError> {
    let mut bindings = PropertyMap::new();
    bindings.insert("inputs".into(), Value::Object(ctx.inputs.clone()));
    bindings.insert(
        primary_name.into(),
        Value::Object(ctx.primary.properties.clone()),
    );
    bindings.insert(
        candidates_name.into(),
        Value::Array(
            ctx.candidates
                .iter()
                .map(|m| Value::Object((*m).clone()))
                .collect(),
        ),
    );

    let result = match script.strip_prefix('@') {
        Some(name) => scripts.evaluate_script(ctx.feature_pack_id, name, &bindings),
        None => scripts.evaluate(script, &bindings),
    }
    .map_err(|source| CompareError::Script {
        filter: filter_name.to_string(),
        source,
    })?;

    Ok(match result {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}
