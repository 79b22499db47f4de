//! Text-map carrier over an object's annotations.

use crate::object::Object;
use opentelemetry::propagation::{Extractor, Injector};
use std::collections::BTreeMap;
use tracing::trace;

/// String key/value view over an object's annotation map.
///
/// Reads never allocate the map. Writes allocate it on first use and land on the
/// borrowed object itself, so persisting that object afterwards carries the
/// propagation fields along.
#[derive(Debug)]
pub struct ObjectCarrier<'a, O> {
    object: Option<&'a mut O>,
}

impl<'a, O: Object> ObjectCarrier<'a, O> {
    pub fn new(object: Option<&'a mut O>) -> Self {
        Self { object }
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        let object = self.object.as_deref()?;
        match object.meta() {
            Ok(meta) => meta.annotations.as_ref(),
            Err(e) => {
                trace!(error = %e, "Object carrier could not read annotations");
                None
            }
        }
    }
}

impl<O: Object> Extractor for ObjectCarrier<'_, O> {
    fn get(&self, key: &str) -> Option<&str> {
        self.annotations()?.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.annotations()
            .map(|annotations| annotations.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl<O: Object> Injector for ObjectCarrier<'_, O> {
    fn set(&mut self, key: &str, value: String) {
        let Some(object) = self.object.as_deref_mut() else {
            return;
        };
        match object.meta_mut() {
            Ok(meta) => {
                meta.annotations
                    .get_or_insert_with(BTreeMap::new)
                    .insert(key.to_string(), value);
            }
            Err(e) => trace!(key, error = %e, "Object carrier could not write annotation"),
        }
    }
}
