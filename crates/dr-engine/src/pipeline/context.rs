use serde_json::{json, Value};

use crate::compare::ObjectRole;
use crate::model::{DiscoveredObject, Job, PropertyMap};

fn job_context(job: &Job) -> Value {
    json!({
        "id": job.id,
        "name": job.name(),
        "featurePack": {
            "id": job.specification.feature_pack_id,
            "name": job.specification.feature_pack_name,
        },
    })
}

/// Context handed to discovery actions: `{inputs, job, source|target}`.
pub fn discovery_substitution_context(
    job: &Job,
    object: Option<(ObjectRole, &PropertyMap)>,
) -> PropertyMap {
    let mut ctx = PropertyMap::new();
    ctx.insert(
        "inputs".into(),
        Value::Object(job.specification.inputs.clone()),
    );
    ctx.insert("job".into(), job_context(job));
    if let Some((role, properties)) = object {
        let key = match role {
            ObjectRole::Source => "source",
            ObjectRole::Target => "target",
        };
        ctx.insert(key.into(), Value::Object(properties.clone()));
    }
    ctx
}

/// Context handed to reconcile actions: `{inputs, source, target, job}`.
pub fn reconcile_substitution_context(
    job: &Job,
    inputs: PropertyMap,
    object: &DiscoveredObject,
) -> PropertyMap {
    let as_value = |m: &Option<PropertyMap>| m.clone().map(Value::Object).unwrap_or(Value::Null);
    let mut ctx = PropertyMap::new();
    ctx.insert("inputs".into(), Value::Object(inputs));
    ctx.insert("source".into(), as_value(&object.source_properties));
    ctx.insert("target".into(), as_value(&object.target_properties));
    ctx.insert("job".into(), job_context(job));
    ctx
}
