use std::collections::HashMap;

use super::object::FetchedObject;
use super::properties::{build_multi_key, PropertiesArg};
use crate::error::{CompareError, ServiceError};

/// Pairs each source with the single target sharing its composite key and
/// gives both sides each other's properties.
///
/// Fails when a key is shared by several targets or when two sources claim
/// the same target. Nothing is linked in that case.
pub fn link_sources_and_targets(
    link_expression: &str,
    sources: &mut [FetchedObject],
    targets: &mut [FetchedObject],
) -> Result<(), CompareError> {
    let arg = PropertiesArg::parse(link_expression)?;
    let non_unique =
        || CompareError::Service(ServiceError::NonUniqueSourceTargetMapping(link_expression.to_string()));

    let mut buckets: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (index, target) in targets.iter().enumerate() {
        if let Some(key) = build_multi_key(&target.properties, arg.right_names()) {
            buckets.entry(key).or_default().push(index);
        }
    }

    let mut pairs = Vec::new();
    let mut claimed = vec![false; targets.len()];
    for (source_index, source) in sources.iter().enumerate() {
        let Some(key) = build_multi_key(&source.properties, arg.left_names()) else {
            continue;
        };
        match buckets.get(&key).map(Vec::as_slice) {
            Some([target_index]) => {
                if std::mem::replace(&mut claimed[*target_index], true) {
                    return Err(non_unique());
                }
                pairs.push((source_index, *target_index));
            }
            Some([]) | None => {}
            Some(_) => return Err(non_unique()),
        }
    }

    for (source_index, target_index) in &pairs {
        sources[*source_index].linked = Some(targets[*target_index].properties.clone());
        targets[*target_index].linked = Some(sources[*source_index].properties.clone());
    }
    log::debug!(
        "Linked {} of {} source(s) using '{}'",
        pairs.len(),
        sources.len(),
        link_expression
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyMap;
    use serde_json::{json, Value};

    fn objects(values: Vec<Value>) -> Vec<FetchedObject> {
        values
            .into_iter()
            .map(|v| FetchedObject::new(v.as_object().cloned().unwrap_or_else(PropertyMap::new)))
            .collect()
    }

    #[test]
    fn test_unique_links_are_bidirectional() {
        let mut sources = objects(vec![json!({"id": 1, "n": "a"}), json!({"id": 2, "n": "b"})]);
        let mut targets = objects(vec![json!({"ext": "2", "m": "y"}), json!({"ext": "9"})]);
        link_sources_and_targets("id:ext", &mut sources, &mut targets).unwrap();

        assert!(!sources[0].is_linked());
        assert!(sources[1].is_linked());
        assert_eq!(sources[1].linked.as_ref().unwrap()["m"], "y");
        assert_eq!(targets[0].linked.as_ref().unwrap()["n"], "b");
        assert!(!targets[1].is_linked());
    }

    #[test]
    fn test_composite_key_order() {
        let mut sources = objects(vec![json!({"a": 1, "b": 2})]);
        let mut targets = objects(vec![json!({"x": 2, "y": 1}), json!({"x": 1, "y": 2})]);
        link_sources_and_targets("a:x&b:y", &mut sources, &mut targets).unwrap();
        assert_eq!(targets[1].linked.as_ref().unwrap()["a"], 1);
        assert!(!targets[0].is_linked());
    }

    #[test]
    fn test_duplicate_target_keys_fail() {
        let mut sources = objects(vec![json!({"id": 1})]);
        let mut targets = objects(vec![json!({"id": 1}), json!({"id": "1"})]);
        let err = link_sources_and_targets("id:id", &mut sources, &mut targets).unwrap_err();
        assert!(err.to_string().contains("id:id"));
        assert!(!sources[0].is_linked());
    }

    #[test]
    fn test_two_sources_one_target_fail() {
        let mut sources = objects(vec![json!({"id": 1}), json!({"id": 1})]);
        let mut targets = objects(vec![json!({"id": 1})]);
        let err = link_sources_and_targets("id:id", &mut sources, &mut targets).unwrap_err();
        assert!(matches!(
            err,
            CompareError::Service(ServiceError::NonUniqueSourceTargetMapping(ref l)) if l == "id:id"
        ));
        assert!(!targets[0].is_linked());
    }

    #[test]
    fn test_null_keys_are_skipped() {
        let mut sources = objects(vec![json!({"id": null}), json!({})]);
        let mut targets = objects(vec![json!({"id": null})]);
        link_sources_and_targets("id:id", &mut sources, &mut targets).unwrap();
        assert!(sources.iter().all(|s| !s.is_linked()));
    }
}
