//! Table handles exposed to contracts
//!
//! `db::create_table` / `db::get_table` hand the contract a `TableRef`,
//! a capability scoped to one fully-qualified collection. Writes only
//! ever reach tables the running contract owns, because handles are
//! only minted for owned tables.

use std::sync::Arc;

use rhai::{Array, Dynamic, EvalAltResult, Map};
use serde_json::Value;

use meridian_store::Database;

/// Capability handle over a single contract-owned table.
#[derive(Clone)]
pub struct TableRef {
    qualified: String,
    db: Arc<Database>,
}

impl TableRef {
    pub fn new(qualified: String, db: Arc<Database>) -> Self {
        Self { qualified, db }
    }

    /// The fully-qualified `<contract>_<table>` collection name.
    pub fn name(&self) -> &str {
        &self.qualified
    }

    pub fn insert(&self, doc: Map) -> Result<Map, Box<EvalAltResult>> {
        let value = map_to_value(doc)?;
        let stored = self
            .db
            .insert(&self.qualified, value)
            .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })?;
        value_to_map(stored)
    }

    pub fn find(&self, query: Map) -> Result<Array, Box<EvalAltResult>> {
        let query = map_to_value(query)?;
        self.db
            .find(&self.qualified, &query)
            .into_iter()
            .map(|doc| rhai::serde::to_dynamic(&doc))
            .collect()
    }

    pub fn find_one(&self, query: Map) -> Result<Dynamic, Box<EvalAltResult>> {
        let query = map_to_value(query)?;
        match self.db.find_one(&self.qualified, &query) {
            Some(doc) => rhai::serde::to_dynamic(&doc),
            None => Ok(Dynamic::UNIT),
        }
    }

    pub fn update(&self, doc: Map) -> Result<bool, Box<EvalAltResult>> {
        let value = map_to_value(doc)?;
        self.db
            .update(&self.qualified, &value)
            .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })
    }

    pub fn remove(&self, doc: Map) -> Result<bool, Box<EvalAltResult>> {
        let value = map_to_value(doc)?;
        self.db
            .remove(&self.qualified, &value)
            .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })
    }
}

/// Convert a script map into a JSON document.
pub fn map_to_value(map: Map) -> Result<Value, Box<EvalAltResult>> {
    rhai::serde::from_dynamic(&Dynamic::from(map))
}

/// Convert a JSON document into a script map.
pub fn value_to_map(value: Value) -> Result<Map, Box<EvalAltResult>> {
    let dynamic = rhai::serde::to_dynamic(&value)?;
    dynamic.try_cast::<Map>().ok_or_else(|| {
        Box::new(EvalAltResult::ErrorRuntime(
            "expected an object".into(),
            rhai::Position::NONE,
        ))
    })
}
