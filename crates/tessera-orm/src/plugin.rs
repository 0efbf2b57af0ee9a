//! Named plugins applied to model classes while they are built.
//!
//! A plugin is a setup function receiving the class builder and a JSON
//! configuration. It runs once per class, inside
//! [`ModelClassBuilder::plugin`], and can register hooks, associations, a
//! default order or a row restriction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tessera_core::{col, SqlValue};

use crate::error::{OrmError, Result};
use crate::hooks::{HookAction, LifecycleEvent};
use crate::model::Model;
use crate::model_class::ModelClassBuilder;

/// Plugin setup function.
pub type PluginSetup<M> = Arc<dyn Fn(&mut ModelClassBuilder<M>, &Value) -> Result<()> + Send + Sync>;

/// Plugins available to model classes, by name.
pub struct PluginRegistry<M> {
    plugins: BTreeMap<String, PluginSetup<M>>,
}

impl<M: Model> PluginRegistry<M> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// A registry holding the bundled plugins: `default_order`, `filtered`
    /// and `read_only`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("default_order", default_order);
        registry.register("filtered", filtered);
        registry.register("read_only", read_only);
        registry
    }

    /// Registers `setup` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, setup: F)
    where
        F: Fn(&mut ModelClassBuilder<M>, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.plugins.insert(String::from(name), Arc::new(setup));
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub(crate) fn get(&self, name: &str) -> Option<PluginSetup<M>> {
        self.plugins.get(name).cloned()
    }
}

impl<M: Model> Default for PluginRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for PluginRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

fn config_error(name: &str, message: impl fmt::Display) -> OrmError {
    OrmError::Plugin {
        name: String::from(name),
        message: message.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct DefaultOrderConfig {
    columns: Vec<String>,
    #[serde(default)]
    descending: bool,
}

/// `{"columns": ["name"], "descending": false}`
fn default_order<M: Model>(builder: &mut ModelClassBuilder<M>, config: &Value) -> Result<()> {
    let config = DefaultOrderConfig::deserialize(config)
        .map_err(|e| config_error("default_order", e))?;
    if config.columns.is_empty() {
        return Err(config_error("default_order", "no columns given"));
    }
    let orderings = config.columns.iter().map(|c| {
        if config.descending {
            col(c).desc()
        } else {
            col(c).asc()
        }
    });
    builder.order(orderings);
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FilteredConfig {
    column: String,
    value: Value,
}

/// `{"column": "active", "value": true}`
fn filtered<M: Model>(builder: &mut ModelClassBuilder<M>, config: &Value) -> Result<()> {
    let config =
        FilteredConfig::deserialize(config).map_err(|e| config_error("filtered", e))?;
    let value = json_to_sql(&config.value).map_err(|e| config_error("filtered", e))?;
    builder.restrict(col(&config.column).eq(value));
    Ok(())
}

fn read_only<M: Model>(builder: &mut ModelClassBuilder<M>, _config: &Value) -> Result<()> {
    builder
        .hook(LifecycleEvent::BeforeSave, |_| HookAction::Stop)
        .hook(LifecycleEvent::BeforeDestroy, |_| HookAction::Stop);
    Ok(())
}

fn json_to_sql(value: &Value) -> std::result::Result<SqlValue, String> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Int)
            .or_else(|| n.as_f64().map(SqlValue::Float))
            .ok_or_else(|| format!("number out of range: {n}")),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(format!("expected a scalar, got {value}")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_to_sql() {
        assert_eq!(json_to_sql(&json!(null)).unwrap(), SqlValue::Null);
        assert_eq!(json_to_sql(&json!(true)).unwrap(), SqlValue::Bool(true));
        assert_eq!(json_to_sql(&json!(7)).unwrap(), SqlValue::Int(7));
        assert_eq!(json_to_sql(&json!(0.5)).unwrap(), SqlValue::Float(0.5));
        assert_eq!(
            json_to_sql(&json!("on")).unwrap(),
            SqlValue::Text(String::from("on"))
        );
        assert!(json_to_sql(&json!([1, 2])).is_err());
    }
}
