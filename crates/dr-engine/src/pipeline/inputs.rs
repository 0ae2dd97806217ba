use crate::config::InputDeclaration;
use crate::error::ServiceError;
use crate::model::PropertyMap;

/// Fails with the names of all mandatory inputs missing from `inputs`.
pub fn validate_inputs(
    declarations: &[InputDeclaration],
    inputs: &PropertyMap,
) -> Result<(), ServiceError> {
    let missing: Vec<String> = declarations
        .iter()
        .filter(|d| d.mandatory && !inputs.contains_key(&d.name))
        .map(|d| d.name.clone())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::MissingInputs(missing))
    }
}

/// Merges input maps; later layers win.
pub fn merge_inputs<'a, I>(layers: I) -> PropertyMap
where
    I: IntoIterator<Item = &'a PropertyMap>,
{
    let mut merged = PropertyMap::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declaration(name: &str, mandatory: bool) -> InputDeclaration {
        InputDeclaration {
            name: name.into(),
            mandatory,
            description: None,
        }
    }

    fn map(v: serde_json::Value) -> PropertyMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_reports_all_missing_mandatory_inputs() {
        let decls = [
            declaration("region", true),
            declaration("limit", false),
            declaration("tenant", true),
            declaration("site", true),
        ];
        let err = validate_inputs(&decls, &map(json!({"site": "a"}))).unwrap_err();
        assert_eq!(
            err,
            ServiceError::MissingInputs(vec!["region".into(), "tenant".into()])
        );
    }

    #[test]
    fn test_null_value_counts_as_present() {
        let decls = [declaration("region", true)];
        assert!(validate_inputs(&decls, &map(json!({"region": null}))).is_ok());
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let job = map(json!({"a": 1, "b": 1}));
        let request = map(json!({"b": 2, "c": 2}));
        let object = map(json!({"c": 3}));
        let merged = merge_inputs([&job, &request, &object]);
        assert_eq!(merged, map(json!({"a": 1, "b": 2, "c": 3})));
    }
}
