//! Change records
//!
//! A [`Change`] describes one proposed mutation of a managed value. It is
//! inert: the [`ChangeManager`](crate::ChangeManager) reads it to derive the
//! next value and writes `before` so the change can be undone.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Conventional value-layer actions
///
/// Any other label is carried as `Custom`. Serializes as its short code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeAction {
    /// Run a callable against the transaction (`PER`)
    Perform,
    /// Insert a new element (`CRE`)
    Create,
    /// Remove an element (`DEL`)
    Delete,
    /// Change an element (`SET`)
    Set,
    /// Change the action of a property (`UPDATE`)
    Update,
    /// Manager-defined action
    Custom(String),
}

impl ChangeAction {
    /// Short code or custom label
    pub fn as_str(&self) -> &str {
        match self {
            ChangeAction::Perform => "PER",
            ChangeAction::Create => "CRE",
            ChangeAction::Delete => "DEL",
            ChangeAction::Set => "SET",
            ChangeAction::Update => "UPDATE",
            ChangeAction::Custom(label) => label,
        }
    }

    /// Does this action carry `label`?
    pub fn is(&self, label: &str) -> bool {
        self.as_str() == label
    }
}

impl From<&str> for ChangeAction {
    fn from(s: &str) -> Self {
        match s {
            "PER" => ChangeAction::Perform,
            "CRE" => ChangeAction::Create,
            "DEL" => ChangeAction::Delete,
            "SET" => ChangeAction::Set,
            "UPDATE" => ChangeAction::Update,
            other => ChangeAction::Custom(other.to_string()),
        }
    }
}

impl From<String> for ChangeAction {
    fn from(s: String) -> Self {
        ChangeAction::from(s.as_str())
    }
}

impl From<ChangeAction> for String {
    fn from(action: ChangeAction) -> Self {
        match action {
            ChangeAction::Custom(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied inputs for a change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeParams {
    /// Payload or new value
    #[serde(default)]
    pub value: Value,
    /// Position or identity hint into the managed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    /// Optional sub-target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,
}

impl ChangeParams {
    /// Params carrying only a value
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Params carrying a key and a value
    pub fn keyed(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            key: Some(key.into()),
            target: None,
        }
    }

    /// Set the target
    pub fn with_target(mut self, target: impl Into<Value>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// One proposed mutation of a managed value of type `V`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<V> {
    /// What to do
    pub action: ChangeAction,
    /// Payload or new value
    pub value: Value,
    /// Managed value before the change was executed
    pub before: Option<V>,
    /// Position or identity hint
    pub key: Option<Value>,
    /// Optional sub-target
    pub target: Option<Value>,
}

impl<V> Change<V> {
    /// Build a change from an action and its params
    pub fn new(action: impl Into<ChangeAction>, params: ChangeParams) -> Self {
        Self {
            action: action.into(),
            value: params.value,
            before: None,
            key: params.key,
            target: params.target,
        }
    }

    /// Key as an index, if it is a non-negative integer
    pub fn index(&self) -> Option<usize> {
        self.key
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|k| usize::try_from(k).ok())
    }
}
