//! Declarative application definitions: how to fetch, compare and
//! reconcile one kind of inventory.

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// An opaque action handed to the [`ActionExecutor`](crate::execution::ActionExecutor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionDescriptor(pub serde_json::Value);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub jobs: Vec<ApplicationJobConfig>,
}

impl ApplicationConfig {
    pub fn job(&self, name: &str) -> Option<&ApplicationJobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationJobConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discover: DiscoverConfig,
    #[serde(default)]
    pub reconcile: Option<ReconcileConfig>,
}

impl ApplicationJobConfig {
    pub fn filter(&self, name: &str) -> Option<&FilterDefinition> {
        self.discover.filters.iter().find(|f| f.name == name)
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.discover.filters.iter().map(|f| f.name.clone()).collect()
    }

    /// Looks up the reconcile action bound to a filter.
    pub fn reconcile_action_for(&self, filter_name: &str) -> Option<&ActionDescriptor> {
        let action_name = self.filter(filter_name)?.reconcile_action.as_deref()?;
        self.reconcile_action(action_name)
    }

    pub fn reconcile_action(&self, action_name: &str) -> Option<&ActionDescriptor> {
        self.reconcile
            .as_ref()?
            .target
            .as_ref()?
            .reconcile_actions
            .get(action_name)
    }

    pub fn reconcile_source_enrich(&self) -> Option<&ActionDescriptor> {
        self.reconcile.as_ref()?.source.as_ref()?.enrich_action.as_ref()
    }

    pub fn reconcile_target_enrich(&self) -> Option<&ActionDescriptor> {
        self.reconcile.as_ref()?.target.as_ref()?.enrich_action.as_ref()
    }

    pub fn reconcile_inputs(&self) -> &[InputDeclaration] {
        self.reconcile
            .as_ref()
            .map(|r| r.inputs.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDeclaration {
    pub name: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverConfig {
    #[serde(default)]
    pub inputs: Vec<InputDeclaration>,
    pub source: DiscoverSourceConfig,
    #[serde(default)]
    pub target: Option<DiscoverTargetConfig>,
    /// `sourceProp:targetProp&sourceProp2:targetProp2`
    #[serde(default)]
    pub link_source_and_target: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_filters",
        serialize_with = "serialize_filters"
    )]
    pub filters: Vec<FilterDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverSourceConfig {
    pub fetch_action: ActionDescriptor,
    #[serde(default)]
    pub enrich_action: Option<ActionDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverTargetConfig {
    #[serde(default)]
    pub fetch_action: Option<ActionDescriptor>,
    #[serde(default)]
    pub enrich_action: Option<ActionDescriptor>,
}

/// A named filter. The name is the key in the `filters` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub condition: Option<FilterCondition>,
    #[serde(default)]
    pub filter_match_text: String,
    #[serde(default)]
    pub reconcile_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub name: ConditionName,
    #[serde(default)]
    pub arg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionName {
    SourceInTarget,
    SourceNotInTarget,
    SourceMismatchedInTarget,
    TargetNotInSource,
    SourceScript,
    TargetScript,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileConfig {
    #[serde(default)]
    pub inputs: Vec<InputDeclaration>,
    #[serde(default)]
    pub source: Option<ReconcileSourceConfig>,
    #[serde(default)]
    pub target: Option<ReconcileTargetConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSourceConfig {
    #[serde(default)]
    pub enrich_action: Option<ActionDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileTargetConfig {
    #[serde(default)]
    pub enrich_action: Option<ActionDescriptor>,
    #[serde(default)]
    pub reconcile_actions: BTreeMap<String, ActionDescriptor>,
}

// Filters are a JSON object keyed by name. Declaration order is evaluation
// order, which relies on serde_json's `preserve_order` map.
fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<FilterDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(name, value)| {
            let mut filter: FilterDefinition =
                serde_json::from_value(value).map_err(serde::de::Error::custom)?;
            filter.name = name;
            Ok(filter)
        })
        .collect()
}

fn serialize_filters<S>(filters: &[FilterDefinition], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(filters.len()))?;
    for filter in filters {
        map.serialize_entry(&filter.name, filter)?;
    }
    map.end()
}
