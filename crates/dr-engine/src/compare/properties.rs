//! Type-blind property comparison and composite keys.

use serde_json::Value;

use crate::error::CompareError;
use crate::model::PropertyMap;

/// Replaces numbers and booleans with their string form, recursing into
/// objects and arrays.
pub fn stringify_scalars(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(stringify_scalars).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), stringify_scalars(v)))
                .collect(),
        ),
        Value::String(_) | Value::Null => value.clone(),
    }
}

/// Equality used by all property-pair conditions: `88 == "88"` and
/// `true == "true"`. A missing or null value on either side never matches.
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_null() && !b.is_null() => {
            a == b || stringify_scalars(a) == stringify_scalars(b)
        }
        _ => false,
    }
}

/// Ordered `left:right` property name pairs, parsed from `a:b&c:d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesArg {
    pairs: Vec<(String, String)>,
}

impl PropertiesArg {
    pub fn parse(arg: &str) -> Result<Self, CompareError> {
        let pairs = arg
            .split('&')
            .map(|pair| {
                let mut parts = pair.split(':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(left), Some(right), None)
                        if !left.trim().is_empty() && !right.trim().is_empty() =>
                    {
                        Ok((left.trim().to_string(), right.trim().to_string()))
                    }
                    _ => Err(CompareError::InvalidPropertyPairs(arg.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn left_names(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(l, _)| l.as_str())
    }

    pub fn right_names(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(_, r)| r.as_str())
    }

    /// Every pair is equal between `left[pair.0]` and `right[pair.1]`.
    pub fn all_equal(&self, left: &PropertyMap, right: &PropertyMap) -> bool {
        self.pairs
            .iter()
            .all(|(l, r)| values_equal(left.get(l), right.get(r)))
    }

    /// At least one pair differs.
    pub fn any_differs(&self, left: &PropertyMap, right: &PropertyMap) -> bool {
        !self.all_equal(left, right)
    }
}

/// Builds a composite key over the named properties, in order.
///
/// Returns `None` when any component is missing or null.
pub fn build_multi_key<'a, I>(properties: &PropertyMap, names: I) -> Option<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut key = Vec::new();
    for name in names {
        match properties.get(name) {
            Some(value) if !value.is_null() => key.push(stringify_scalars(value).to_string()),
            _ => {
                log::warn!("Cannot build key, property '{}' is null or missing", name);
                return None;
            }
        }
    }
    Some(key)
}
