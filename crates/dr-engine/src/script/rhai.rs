use std::sync::Arc;

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;

use super::{ScriptAssets, ScriptEvaluator};
use crate::error::ScriptError;
use crate::model::PropertyMap;

const DEFAULT_MAX_OPERATIONS: u64 = 100_000;
const DEFAULT_MAX_CALL_LEVELS: usize = 32;
const DEFAULT_MAX_STRING_SIZE: usize = 65_536;
const DEFAULT_MAX_ARRAY_SIZE: usize = 100_000;
const DEFAULT_MAX_MAP_SIZE: usize = 10_000;

/// Resource limits applied to every evaluation.
#[derive(Debug, Clone)]
pub struct RhaiConfig {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for RhaiConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_levels: DEFAULT_MAX_CALL_LEVELS,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
        }
    }
}

/// [`ScriptEvaluator`] backed by Rhai.
///
/// A fresh engine is built per evaluation, so scripts share no state. Loops
/// are allowed but bounded by the operation limit; there is no file or
/// network access.
pub struct RhaiScriptEvaluator {
    config: RhaiConfig,
    assets: Arc<dyn ScriptAssets>,
}

impl RhaiScriptEvaluator {
    pub fn new(assets: Arc<dyn ScriptAssets>) -> Self {
        Self::with_config(assets, RhaiConfig::default())
    }

    pub fn with_config(assets: Arc<dyn ScriptAssets>, config: RhaiConfig) -> Self {
        Self { config, assets }
    }

    fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.config.max_operations);
        engine.set_max_call_levels(self.config.max_call_levels);
        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_array_size(self.config.max_array_size);
        engine.set_max_map_size(self.config.max_map_size);
        engine.set_strict_variables(true);
        engine.on_print(|msg| log::debug!("script: {}", msg));
        engine
    }

    fn build_scope(bindings: &PropertyMap) -> Result<Scope<'static>, ScriptError> {
        let mut scope = Scope::new();
        for (name, value) in bindings {
            let dynamic = rhai::serde::to_dynamic(value)
                .map_err(|e| ScriptError::Conversion(e.to_string()))?;
            scope.push_constant_dynamic(name.clone(), dynamic);
        }
        Ok(scope)
    }

    fn eval(&self, script: &str, bindings: &PropertyMap) -> Result<Value, ScriptError> {
        let engine = self.create_engine();
        let mut scope = Self::build_scope(bindings)?;
        let ast = engine
            .compile_with_scope(&scope, script)
            .map_err(|e| ScriptError::Evaluation(format!("compilation error: {e}")))?;
        let result = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| ScriptError::Evaluation(e.to_string()))?;
        rhai::serde::from_dynamic::<Value>(&result)
            .map_err(|e| ScriptError::Conversion(e.to_string()))
    }
}

impl ScriptEvaluator for RhaiScriptEvaluator {
    fn evaluate(&self, expression: &str, bindings: &PropertyMap) -> Result<Value, ScriptError> {
        self.eval(expression, bindings)
    }

    fn evaluate_script(
        &self,
        feature_pack_id: &str,
        name: &str,
        bindings: &PropertyMap,
    ) -> Result<Value, ScriptError> {
        let body = self
            .assets
            .script(feature_pack_id, name)
            .ok_or_else(|| ScriptError::NotFound {
                feature_pack: feature_pack_id.to_string(),
                name: name.to_string(),
            })?;
        self.eval(&body, bindings)
    }

    fn render(
        &self,
        template: &str,
        context: &PropertyMap,
        _feature_pack_id: &str,
    ) -> Result<String, ScriptError> {
        if !template.contains("${") {
            return Ok(template.to_string());
        }
        // Rhai back-tick strings interpolate `${...}`; a literal back-tick is doubled.
        let script = format!("`{}`", template.replace('`', "``"));
        match self.eval(&script, context)? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Assets(HashMap<(String, String), String>);

    impl ScriptAssets for Assets {
        fn script(&self, fp: &str, name: &str) -> Option<String> {
            self.0.get(&(fp.to_string(), name.to_string())).cloned()
        }
    }

    fn evaluator() -> RhaiScriptEvaluator {
        let mut assets = Assets::default();
        assets.0.insert(
            ("fp".into(), "large".into()),
            "source.size > inputs.threshold".into(),
        );
        RhaiScriptEvaluator::new(Arc::new(assets))
    }

    fn bindings() -> PropertyMap {
        json!({
            "inputs": { "threshold": 10 },
            "source": { "name": "a", "size": 12 },
            "targets": [ { "name": "a" }, { "name": "b" } ]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_inline_expression() {
        let result = evaluator()
            .evaluate("source.size > inputs.threshold", &bindings())
            .unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn test_expression_over_candidates() {
        let script = r#"targets.len() == 2 && targets[0].name == source.name"#;
        let result = evaluator().evaluate(script, &bindings()).unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn test_named_script() {
        let result = evaluator()
            .evaluate_script("fp", "large", &bindings())
            .unwrap();
        assert_eq!(result, json!(true));
        let err = evaluator()
            .evaluate_script("fp", "unknown", &bindings())
            .unwrap_err();
        assert!(matches!(err, ScriptError::NotFound { .. }));
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let err = evaluator().evaluate("missing > 1", &bindings()).unwrap_err();
        assert!(matches!(err, ScriptError::Evaluation(_)));
    }

    #[test]
    fn test_runaway_script_is_stopped() {
        let err = evaluator().evaluate("loop { }", &bindings()).unwrap_err();
        assert!(matches!(err, ScriptError::Evaluation(_)));
    }

    #[test]
    fn test_render_template() {
        let rendered = evaluator()
            .render("name=${source.name} size=${source.size}", &bindings(), "fp")
            .unwrap();
        assert_eq!(rendered, "name=a size=12");
        let plain = evaluator().render("no placeholders", &bindings(), "fp").unwrap();
        assert_eq!(plain, "no placeholders");
    }
}
