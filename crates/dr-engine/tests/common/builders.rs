//! Builders for application definitions and job requests.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

use dr_engine::{load_application_from_str, ApplicationConfig, JobSpecificationRequest};

pub const FEATURE_PACK: &str = "fp";
pub const APPLICATION: &str = "inventory";
pub const JOB: &str = "sync";

/// Builds a single-job application definition.
pub struct AppBuilder {
    discover_inputs: Vec<Value>,
    source: Map<String, Value>,
    target: Option<Map<String, Value>>,
    link: Option<String>,
    filters: Map<String, Value>,
    reconcile_inputs: Vec<Value>,
    reconcile_actions: Map<String, Value>,
}

impl AppBuilder {
    /// Sources come from the `sources` op.
    pub fn new() -> Self {
        let mut source = Map::new();
        source.insert("fetchAction".into(), op("sources"));
        Self {
            discover_inputs: vec![],
            source,
            target: None,
            link: None,
            filters: Map::new(),
            reconcile_inputs: vec![],
            reconcile_actions: Map::new(),
        }
    }

    pub fn source_enrich(mut self, name: &str) -> Self {
        self.source.insert("enrichAction".into(), op(name));
        self
    }

    /// Targets come from the `targets` op.
    pub fn with_targets(mut self) -> Self {
        let mut target = Map::new();
        target.insert("fetchAction".into(), op("targets"));
        self.target = Some(target);
        self
    }

    pub fn link(mut self, expression: &str) -> Self {
        self.link = Some(expression.to_string());
        self
    }

    pub fn discover_input(mut self, name: &str) -> Self {
        self.discover_inputs.push(json!({"name": name, "mandatory": true}));
        self
    }

    pub fn reconcile_input(mut self, name: &str) -> Self {
        self.reconcile_inputs.push(json!({"name": name, "mandatory": true}));
        self
    }

    /// Adds a filter whose reconcile action is the op of the same name.
    pub fn filter(mut self, name: &str, condition: Option<(&str, &str)>, action: &str) -> Self {
        let mut filter = json!({
            "filterMatchText": format!("{name} matched"),
            "reconcileAction": action,
        });
        if let Some((condition, arg)) = condition {
            filter["condition"] = json!({"name": condition, "arg": arg});
        }
        self.filters.insert(name.to_string(), filter);
        self.reconcile_actions.insert(action.to_string(), op(action));
        self
    }

    pub fn to_json(&self) -> Value {
        let mut discover = json!({
            "inputs": self.discover_inputs,
            "source": self.source,
            "filters": self.filters,
        });
        if let Some(target) = &self.target {
            discover["target"] = Value::Object(target.clone());
        }
        if let Some(link) = &self.link {
            discover["linkSourceAndTarget"] = json!(link);
        }
        json!({
            "name": APPLICATION,
            "jobs": [{
                "name": JOB,
                "discover": discover,
                "reconcile": {
                    "inputs": self.reconcile_inputs,
                    "target": {"reconcileActions": self.reconcile_actions},
                },
            }],
        })
    }

    pub fn build(&self) -> ApplicationConfig {
        load_application_from_str(&self.to_json().to_string()).expect("valid application")
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An action descriptor the fake executor dispatches on.
pub fn op(name: &str) -> Value {
    json!({"op": name})
}

pub fn job_request() -> JobSpecificationRequest {
    JobSpecificationRequest {
        feature_pack_name: Some(FEATURE_PACK.into()),
        application_name: Some(APPLICATION.into()),
        application_job_name: JOB.into(),
        ..Default::default()
    }
}
