use crate::model::{NewDiscoveredObject, NewFilter, PropertyMap};

/// Which inventory an object was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRole {
    Source,
    Target,
}

/// A record fetched during discovery, before it is persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedObject {
    pub properties: PropertyMap,
    /// Properties of the counterpart this object was linked to.
    pub linked: Option<PropertyMap>,
    pub matches: Vec<NewFilter>,
}

impl FetchedObject {
    pub fn new(properties: PropertyMap) -> Self {
        Self {
            properties,
            linked: None,
            matches: Vec::new(),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Shallow merge, enrichment values win.
    pub fn merge(&mut self, enrichment: PropertyMap) {
        self.properties.extend(enrichment);
    }

    pub fn into_new_discovered(self, role: ObjectRole) -> NewDiscoveredObject {
        match role {
            ObjectRole::Source => NewDiscoveredObject {
                source_properties: Some(self.properties),
                target_properties: self.linked,
                filters: self.matches,
            },
            ObjectRole::Target => NewDiscoveredObject {
                source_properties: self.linked,
                target_properties: Some(self.properties),
                filters: self.matches,
            },
        }
    }
}
