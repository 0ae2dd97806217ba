//! Resolution of feature packs, applications and application jobs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use walkdir::WalkDir;

use crate::config::application::{ApplicationConfig, ApplicationJobConfig};
use crate::config::loader::load_application;
use crate::error::{ConfigError, ServiceError};
use crate::model::JobSpecificationRequest;
use crate::script::ScriptAssets;

/// Identity of a resolved application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRef {
    pub feature_pack_id: String,
    pub feature_pack_name: String,
    pub application_id: String,
    pub application_name: String,
}

/// Read-only lookup of application definitions.
pub trait ApplicationCatalog: Send + Sync {
    /// Resolves the feature pack and application named by a job specification.
    fn resolve(&self, request: &JobSpecificationRequest) -> Result<ApplicationRef, ServiceError>;

    fn find_job(&self, application_id: &str, job_name: &str)
        -> Option<Arc<ApplicationJobConfig>>;
}

struct ApplicationEntry {
    id: String,
    name: String,
    jobs: Vec<Arc<ApplicationJobConfig>>,
}

#[derive(Default)]
struct FeaturePackEntry {
    id: String,
    name: String,
    applications: Vec<ApplicationEntry>,
    scripts: HashMap<String, String>,
}

/// Catalog of feature packs, loaded from `<root>/<featurePack>/*.json`
/// (applications) and `<root>/<featurePack>/*.rhai` (named scripts).
///
/// Feature pack ids are their directory names; application ids are
/// `<featurePack>/<application>`.
#[derive(Default)]
pub struct FileApplicationCatalog {
    packs: RwLock<Vec<FeaturePackEntry>>,
}

impl FileApplicationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_dir<P: AsRef<Path>>(root: P) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let catalog = Self::new();

        for entry in WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| ConfigError::Scan {
                path: root.to_path_buf(),
                source: e,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(pack) = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
            else {
                continue;
            };

            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => {
                    let app = load_application(path)?;
                    catalog.register_application(pack, app);
                }
                Some("rhai") => {
                    let body = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                    if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                        catalog.register_script(pack, name, body);
                    }
                }
                _ => log::debug!("Ignoring {}", path.display()),
            }
        }

        log::info!(
            "Loaded {} feature pack(s) from {}",
            catalog.feature_pack_count(),
            root.display()
        );
        Ok(catalog)
    }

    /// Adds (or replaces) an application in a feature pack. Returns the application id.
    pub fn register_application(&self, feature_pack: &str, app: ApplicationConfig) -> String {
        let id = format!("{}/{}", feature_pack, app.name);
        let entry = ApplicationEntry {
            id: id.clone(),
            name: app.name,
            jobs: app.jobs.into_iter().map(Arc::new).collect(),
        };
        self.with_pack(feature_pack, |pack| {
            pack.applications.retain(|a| a.id != entry.id);
            pack.applications.push(entry);
        });
        id
    }

    pub fn register_script(&self, feature_pack: &str, name: &str, body: String) {
        self.with_pack(feature_pack, |pack| {
            pack.scripts.insert(name.to_string(), body);
        });
    }

    pub fn feature_pack_count(&self) -> usize {
        self.packs.read().map(|p| p.len()).unwrap_or(0)
    }

    fn with_pack<F: FnOnce(&mut FeaturePackEntry)>(&self, feature_pack: &str, f: F) {
        let mut packs = match self.packs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(pack) = packs.iter_mut().find(|p| p.id == feature_pack) {
            f(pack);
        } else {
            let mut pack = FeaturePackEntry {
                id: feature_pack.to_string(),
                name: feature_pack.to_string(),
                ..Default::default()
            };
            f(&mut pack);
            packs.push(pack);
        }
    }
}

impl ApplicationCatalog for FileApplicationCatalog {
    fn resolve(&self, request: &JobSpecificationRequest) -> Result<ApplicationRef, ServiceError> {
        if request.feature_pack_id.is_none() && request.feature_pack_name.is_none() {
            return Err(ServiceError::IdOrNameNotProvided("feature pack".into()));
        }
        if request.application_id.is_none() && request.application_name.is_none() {
            return Err(ServiceError::IdOrNameNotProvided("application".into()));
        }

        let packs = self
            .packs
            .read()
            .map_err(|_| ServiceError::FeaturePackNotFound("<catalog unavailable>".into()))?;

        let pack = packs
            .iter()
            .find(|p| match (&request.feature_pack_id, &request.feature_pack_name) {
                (Some(id), _) => &p.id == id,
                (None, Some(name)) => &p.name == name,
                (None, None) => false,
            })
            .ok_or_else(|| {
                ServiceError::FeaturePackNotFound(
                    request
                        .feature_pack_id
                        .clone()
                        .or_else(|| request.feature_pack_name.clone())
                        .unwrap_or_default(),
                )
            })?;

        let app = pack
            .applications
            .iter()
            .find(|a| match (&request.application_id, &request.application_name) {
                (Some(id), _) => &a.id == id,
                (None, Some(name)) => &a.name == name,
                (None, None) => false,
            })
            .ok_or_else(|| {
                ServiceError::AppNotFound(
                    request
                        .application_id
                        .clone()
                        .or_else(|| request.application_name.clone())
                        .unwrap_or_default(),
                )
            })?;

        Ok(ApplicationRef {
            feature_pack_id: pack.id.clone(),
            feature_pack_name: pack.name.clone(),
            application_id: app.id.clone(),
            application_name: app.name.clone(),
        })
    }

    fn find_job(
        &self,
        application_id: &str,
        job_name: &str,
    ) -> Option<Arc<ApplicationJobConfig>> {
        let packs = self.packs.read().ok()?;
        packs
            .iter()
            .flat_map(|p| p.applications.iter())
            .find(|a| a.id == application_id)?
            .jobs
            .iter()
            .find(|j| j.name == job_name)
            .cloned()
    }
}

impl ScriptAssets for FileApplicationCatalog {
    fn script(&self, feature_pack_id: &str, name: &str) -> Option<String> {
        let packs = self.packs.read().ok()?;
        packs
            .iter()
            .find(|p| p.id == feature_pack_id)?
            .scripts
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = r#"{
        "name": "inventory",
        "jobs": [{ "name": "sync", "discover": { "source": { "fetchAction": { "cmd": "ls" } } } }]
    }"#;

    fn request(fp: Option<&str>, app: Option<&str>) -> JobSpecificationRequest {
        JobSpecificationRequest {
            feature_pack_name: fp.map(String::from),
            application_name: app.map(String::from),
            application_job_name: "sync".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_dir_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let pack = dir.path().join("fp1");
        std::fs::create_dir_all(&pack).unwrap();
        std::fs::write(pack.join("inventory.json"), APP).unwrap();
        std::fs::write(pack.join("is_big.rhai"), "source.size > 10").unwrap();
        std::fs::write(pack.join("README.md"), "ignored").unwrap();

        let catalog = FileApplicationCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.feature_pack_count(), 1);

        let app = catalog.resolve(&request(Some("fp1"), Some("inventory"))).unwrap();
        assert_eq!(app.application_id, "fp1/inventory");
        assert!(catalog.find_job(&app.application_id, "sync").is_some());
        assert!(catalog.find_job(&app.application_id, "other").is_none());
        assert_eq!(
            catalog.script("fp1", "is_big").as_deref(),
            Some("source.size > 10")
        );
    }

    #[test]
    fn test_resolve_errors() {
        let catalog = FileApplicationCatalog::new();
        catalog.register_application("fp1", serde_json::from_str(APP).unwrap());

        assert_eq!(
            catalog.resolve(&request(None, Some("inventory"))).unwrap_err(),
            ServiceError::IdOrNameNotProvided("feature pack".into())
        );
        assert_eq!(
            catalog.resolve(&request(Some("fp1"), None)).unwrap_err(),
            ServiceError::IdOrNameNotProvided("application".into())
        );
        assert_eq!(
            catalog.resolve(&request(Some("fp2"), Some("inventory"))).unwrap_err(),
            ServiceError::FeaturePackNotFound("fp2".into())
        );
        assert_eq!(
            catalog.resolve(&request(Some("fp1"), Some("nope"))).unwrap_err(),
            ServiceError::AppNotFound("nope".into())
        );
    }

    #[test]
    fn test_register_replaces_application() {
        let catalog = FileApplicationCatalog::new();
        let id = catalog.register_application("fp1", serde_json::from_str(APP).unwrap());
        let id2 = catalog.register_application("fp1", serde_json::from_str(APP).unwrap());
        assert_eq!(id, id2);
        assert_eq!(catalog.feature_pack_count(), 1);
    }
}
