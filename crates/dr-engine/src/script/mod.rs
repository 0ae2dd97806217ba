//! Sandboxed evaluation of filter scripts and templates.

mod rhai;

pub use self::rhai::{RhaiConfig, RhaiScriptEvaluator};

use serde_json::Value;

use crate::error::ScriptError;
use crate::model::PropertyMap;

/// Evaluates expressions against a fixed set of named bindings.
pub trait ScriptEvaluator: Send + Sync {
    /// Evaluates an inline expression.
    fn evaluate(&self, expression: &str, bindings: &PropertyMap) -> Result<Value, ScriptError>;

    /// Evaluates a named script shipped in a feature pack.
    fn evaluate_script(
        &self,
        feature_pack_id: &str,
        name: &str,
        bindings: &PropertyMap,
    ) -> Result<Value, ScriptError>;

    /// Renders a template containing `${expression}` placeholders.
    fn render(
        &self,
        template: &str,
        context: &PropertyMap,
        feature_pack_id: &str,
    ) -> Result<String, ScriptError>;
}

/// Source of named scripts, per feature pack.
pub trait ScriptAssets: Send + Sync {
    fn script(&self, feature_pack_id: &str, name: &str) -> Option<String>;
}
