#![allow(missing_docs)]
//! WASM bindings for the elizaOS persistence core
//!
//! The host creates the PGLite instance and passes it in; everything else
//! (migrations, memory storage) runs in Rust against it.

use std::sync::Arc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::adapter::SqlDatabaseAdapter;
use crate::base::DatabaseAdapter;
use crate::config::DatabaseConfig;
use crate::error::StorageError;
use crate::executor::SqlExecutor;
use crate::migration::{derive_schema_name, ExtensionSchema};
use crate::pglite::PgLiteManager;
use crate::types::UUID;

fn to_js_error(err: StorageError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Initialize the WASM module with panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init_wasm() {
    console_error_panic_hook::set_once();
}

/// Get the version of the plugin
#[wasm_bindgen(js_name = "getVersion")]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Namespace an extension's tables are placed in
#[wasm_bindgen(js_name = "deriveSchemaName")]
pub fn derive_schema_name_js(extension_name: &str) -> String {
    derive_schema_name(extension_name)
}

/// Storage handle for one agent over a host-provided PGLite instance
#[wasm_bindgen]
pub struct PersistenceHandle {
    adapter: Arc<SqlDatabaseAdapter>,
}

#[wasm_bindgen]
impl PersistenceHandle {
    #[wasm_bindgen(constructor)]
    pub fn new(pglite: JsValue, agent_id: &str) -> Result<PersistenceHandle, JsValue> {
        let agent_id = UUID::parse_str(agent_id)
            .map_err(|e| JsValue::from_str(&format!("Invalid agent id: {e}")))?;
        let executor: Arc<dyn SqlExecutor> = Arc::new(PgLiteManager::new(pglite).map_err(to_js_error)?);
        let adapter = SqlDatabaseAdapter::new(executor, agent_id, &DatabaseConfig::default());
        Ok(PersistenceHandle {
            adapter: Arc::new(adapter),
        })
    }

    /// Migrate the core tables; resolves to undefined
    pub fn init(&self) -> js_sys::Promise {
        let adapter = self.adapter.clone();
        future_to_promise(async move {
            adapter.init().await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Migrate an extension from its JSON table descriptors; resolves to the report as JSON
    #[wasm_bindgen(js_name = "migrateExtension")]
    pub fn migrate_extension(&self, extension_name: String, descriptors_json: String) -> js_sys::Promise {
        let adapter = self.adapter.clone();
        future_to_promise(async move {
            let exports: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&descriptors_json)
                    .map_err(|e| JsValue::from_str(&format!("Failed to parse descriptors: {e}")))?;
            let schema = ExtensionSchema::from_descriptors(extension_name, &exports);
            let reports = adapter
                .run_plugin_migrations(std::slice::from_ref(&schema))
                .await
                .map_err(to_js_error)?;
            let json = serde_json::to_string(&reports)
                .map_err(|e| JsValue::from_str(&format!("Failed to serialize report: {e}")))?;
            Ok(JsValue::from_str(&json))
        })
    }

    /// Set the embedding dimension for this agent
    #[wasm_bindgen(js_name = "ensureEmbeddingDimension")]
    pub fn ensure_embedding_dimension(&self, dimension: usize) -> js_sys::Promise {
        let adapter = self.adapter.clone();
        future_to_promise(async move {
            adapter
                .ensure_embedding_dimension(dimension)
                .await
                .map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn close(&self) -> js_sys::Promise {
        let adapter = self.adapter.clone();
        future_to_promise(async move {
            adapter.close().await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }
}
