//! # Domain Objects
//!
//! The dispatch core treats objects as opaque. It only needs three capabilities:
//! a unique identifier, a mutable string-keyed annotation map, and a deep copy.
//! [`Object`] captures the first two through [`ObjectMeta`] accessors that may fail;
//! `Clone` provides the copy.

use crate::error::AccessorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identity and annotation metadata shared by every dispatchable object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// `None` until the first write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    /// `namespace/name`, or just `name` for cluster-scoped objects.
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

/// Capability set the dispatcher requires from a domain object.
///
/// Accessors are fallible so that objects whose metadata cannot be located
/// (partially decoded payloads, list wrappers) can still flow through dispatch.
pub trait Object: Clone + Send + Sync + 'static {
    fn meta(&self) -> Result<&ObjectMeta, AccessorError>;

    fn meta_mut(&mut self) -> Result<&mut ObjectMeta, AccessorError>;
}

impl Object for ObjectMeta {
    fn meta(&self) -> Result<&ObjectMeta, AccessorError> {
        Ok(self)
    }

    fn meta_mut(&mut self) -> Result<&mut ObjectMeta, AccessorError> {
        Ok(self)
    }
}

/// Schemaless object: metadata plus an arbitrary JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub data: Value,
}

impl DynamicObject {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            metadata,
            data: Value::Object(Default::default()),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

impl Object for DynamicObject {
    fn meta(&self) -> Result<&ObjectMeta, AccessorError> {
        Ok(&self.metadata)
    }

    fn meta_mut(&mut self) -> Result<&mut ObjectMeta, AccessorError> {
        Ok(&mut self.metadata)
    }
}
