//! Stage step domain types

use serde::{Deserialize, Serialize};

/// How an input variable gets its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
    Value,
    RefPreCi,
    RefPostCi,
    RefGlobal,
    RefPlugin,
}

/// Input or output variable of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableObject {
    pub name: String,
    pub format: String,
    #[serde(default)]
    pub value: String,
    pub variable_type: VariableType,
    #[serde(default)]
    pub reference_variable_name: String,
}

impl VariableObject {
    /// String variable resolved from a system (global) variable of the same name
    pub fn global_ref(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            format: "STRING".to_string(),
            value: value.to_string(),
            variable_type: VariableType::RefGlobal,
            reference_variable_name: name.to_string(),
        }
    }
}

/// What a step executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stepType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// Shell script written inline in the stage
    Inline { script: String },
    /// Step backed by a registered plugin
    RefPlugin {
        #[serde(rename = "refPluginId")]
        ref_plugin_id: i64,
    },
}

/// One step of a pre/post deployment stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub name: String,
    pub index: u32,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub input_vars: Vec<VariableObject>,
    #[serde(default)]
    pub output_vars: Vec<VariableObject>,
}

impl StepDefinition {
    pub fn is_inline(&self) -> bool {
        matches!(self.kind, StepKind::Inline { .. })
    }

    pub fn ref_plugin_id(&self) -> Option<i64> {
        match self.kind {
            StepKind::RefPlugin { ref_plugin_id } => Some(ref_plugin_id),
            StepKind::Inline { .. } => None,
        }
    }

    pub fn input_value(&self, name: &str) -> Option<&str> {
        self.input_vars
            .iter()
            .find(|var| var.name == name)
            .map(|var| var.value.as_str())
    }
}

/// Steps of a referenced plugin, shipped alongside the stage steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefPluginObject {
    pub id: i64,
    pub steps: Vec<StepDefinition>,
}
