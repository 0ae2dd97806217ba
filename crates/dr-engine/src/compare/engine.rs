use std::sync::Arc;

use super::condition::{Condition, ConditionSide, FilterContext};
use super::object::FetchedObject;
use crate::config::FilterDefinition;
use crate::error::CompareError;
use crate::model::{NewFilter, PropertyMap};
use crate::script::ScriptEvaluator;

/// Runs an application job's filters over fetched sources and targets and
/// records each match on the object it is anchored on.
#[derive(Clone)]
pub struct ComparisonEngine {
    scripts: Arc<dyn ScriptEvaluator>,
}

impl ComparisonEngine {
    pub fn new(scripts: Arc<dyn ScriptEvaluator>) -> Self {
        Self { scripts }
    }

    /// Evaluates filters in declaration order. Every primary object gets a
    /// fresh candidate list, so narrowing never carries over.
    pub fn compare(
        &self,
        filters: &[FilterDefinition],
        sources: &mut [FetchedObject],
        targets: &mut [FetchedObject],
        inputs: &PropertyMap,
        feature_pack_id: &str,
    ) -> Result<(), CompareError> {
        for filter in filters {
            let condition = Condition::from_definition(filter)?;
            let (primaries, candidates) = match condition.side() {
                ConditionSide::Source => (&mut *sources, &*targets),
                ConditionSide::Target => (&mut *targets, &*sources),
            };

            let candidate_props: Vec<&PropertyMap> =
                candidates.iter().map(|c| &c.properties).collect();
            let mut matched = Vec::new();
            for (index, primary) in primaries.iter().enumerate() {
                let mut ctx = FilterContext {
                    primary,
                    candidates: candidate_props.clone(),
                    inputs,
                    feature_pack_id,
                };
                if condition.test(&filter.name, &mut ctx, self.scripts.as_ref())? {
                    matched.push(index);
                }
            }

            log::debug!(
                "Filter '{}' matched {} of {} object(s)",
                filter.name,
                matched.len(),
                primaries.len()
            );
            for index in matched {
                primaries[index].matches.push(NewFilter {
                    name: filter.name.clone(),
                    discrepancy: filter.filter_match_text.clone(),
                    reconcile_action: filter.reconcile_action.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConditionName, FilterCondition};
    use crate::error::ScriptError;
    use serde_json::{json, Value};

    struct NoScripts;

    impl ScriptEvaluator for NoScripts {
        fn evaluate(&self, _: &str, _: &PropertyMap) -> Result<Value, ScriptError> {
            Ok(Value::Bool(true))
        }
        fn evaluate_script(&self, _: &str, _: &str, _: &PropertyMap) -> Result<Value, ScriptError> {
            Ok(Value::Bool(true))
        }
        fn render(&self, t: &str, _: &PropertyMap, _: &str) -> Result<String, ScriptError> {
            Ok(t.to_string())
        }
    }

    fn filter(name: &str, condition: Option<(ConditionName, Option<&str>)>) -> FilterDefinition {
        FilterDefinition {
            name: name.into(),
            condition: condition.map(|(name, arg)| FilterCondition {
                name,
                arg: arg.map(String::from),
            }),
            filter_match_text: format!("{name} matched"),
            reconcile_action: Some(format!("{name}-action")),
        }
    }

    fn objects(values: Vec<Value>) -> Vec<FetchedObject> {
        values
            .into_iter()
            .map(|v| FetchedObject::new(v.as_object().cloned().unwrap()))
            .collect()
    }

    fn engine() -> ComparisonEngine {
        ComparisonEngine::new(Arc::new(NoScripts))
    }

    #[test]
    fn test_no_targets_every_source_not_in_target() {
        let mut sources = objects(vec![json!({"id": 1}), json!({"id": 2})]);
        let mut targets = vec![];
        let filters = vec![filter("missing", Some((ConditionName::SourceNotInTarget, None)))];
        engine()
            .compare(&filters, &mut sources, &mut targets, &PropertyMap::new(), "fp")
            .unwrap();
        for source in &sources {
            assert_eq!(source.matches.len(), 1);
            assert_eq!(source.matches[0].name, "missing");
            assert_eq!(source.matches[0].discrepancy, "missing matched");
            assert_eq!(source.matches[0].reconcile_action.as_deref(), Some("missing-action"));
        }
    }

    #[test]
    fn test_target_filters_anchor_on_targets() {
        let mut sources = objects(vec![json!({"id": 1})]);
        let mut targets = objects(vec![json!({"id": 1}), json!({"id": 2})]);
        let filters = vec![filter("extra", Some((ConditionName::TargetNotInSource, Some("id:id"))))];
        engine()
            .compare(&filters, &mut sources, &mut targets, &PropertyMap::new(), "fp")
            .unwrap();
        assert!(sources[0].matches.is_empty());
        assert!(targets[0].matches.is_empty());
        assert_eq!(targets[1].matches[0].name, "extra");
    }

    #[test]
    fn test_matches_follow_filter_order() {
        let mut sources = objects(vec![json!({"id": 1})]);
        let mut targets = objects(vec![json!({"id": 1})]);
        let filters = vec![
            filter("second", None),
            filter("first", Some((ConditionName::SourceInTarget, Some("id:id")))),
        ];
        engine()
            .compare(&filters, &mut sources, &mut targets, &PropertyMap::new(), "fp")
            .unwrap();
        let names: Vec<_> = sources[0].matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_narrowing_does_not_leak_between_sources_or_filters() {
        // Both sources match the same target. Consumption by the first must
        // not hide it from the second, nor from the next filter.
        let mut sources = objects(vec![json!({"k": "a"}), json!({"k": "a"})]);
        let mut targets = objects(vec![json!({"k": "a"})]);
        let filters = vec![
            filter("present", Some((ConditionName::SourceInTarget, Some("k:k")))),
            filter("present-again", Some((ConditionName::SourceInTarget, Some("k:k")))),
        ];
        engine()
            .compare(&filters, &mut sources, &mut targets, &PropertyMap::new(), "fp")
            .unwrap();
        assert_eq!(sources[0].matches.len(), 2);
        assert_eq!(sources[1].matches.len(), 2);
    }

    #[test]
    fn test_unmatched_objects_have_no_filters() {
        let mut sources = objects(vec![json!({"id": 1})]);
        let mut targets = objects(vec![json!({"id": 1})]);
        let filters = vec![filter("missing", Some((ConditionName::SourceNotInTarget, Some("id:id"))))];
        engine()
            .compare(&filters, &mut sources, &mut targets, &PropertyMap::new(), "fp")
            .unwrap();
        assert!(sources[0].matches.is_empty());
    }
}
