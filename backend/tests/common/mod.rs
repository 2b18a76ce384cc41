//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bonded_inventory::config::{
    Config, DatabaseConfig, InswConfig, InswEndpoints, InswMode, JwtConfig, ServerConfig,
    TransmissionConfig,
};
use bonded_inventory::external::insw::{GatewayError, InswCategory, InswGateway, InswPayload};
use bonded_inventory::middleware::auth::{AuthContext, ADMIN_ROLE};
use bonded_inventory::repository::{MemoryStore, Store};
use bonded_inventory::AppState;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use shared::{Company, CreateDocumentInput, CustomsDocument, DocumentItemInput};

pub const COMPANY: &str = "KB01";
pub const OTHER_COMPANY: &str = "KB02";
pub const JWT_SECRET: &str = "test-secret";

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn company(code: &str) -> Company {
    Company {
        code: code.to_string(),
        name: format!("PT {}", code),
        npwp: Some("01.234.567.8-901.234".to_string()),
        ppkek_number: Some(format!("PPKEK-{}", code)),
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_company(company(COMPANY))
            .with_company(company(OTHER_COMPANY)),
    )
}

pub fn admin(company_code: &str) -> AuthContext {
    AuthContext {
        user_id: "user-1".to_string(),
        company_code: company_code.to_string(),
        role: ADMIN_ROLE.to_string(),
        permissions: Vec::new(),
    }
}

pub fn operator(company_code: &str, permissions: &[&str]) -> AuthContext {
    AuthContext {
        user_id: "user-2".to_string(),
        company_code: company_code.to_string(),
        role: "operator".to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

pub fn item(code: &str, quantity: &str) -> DocumentItemInput {
    DocumentItemInput {
        item_code: code.to_string(),
        item_type: "raw_material".to_string(),
        item_name: format!("Item {}", code),
        uom: "KGM".to_string(),
        quantity: dec(quantity),
        value_amount: None,
        currency: None,
    }
}

pub fn document_input(wms_id: &str, on: NaiveDate, items: Vec<DocumentItemInput>) -> CreateDocumentInput {
    CreateDocumentInput {
        wms_id: wms_id.to_string(),
        document_date: on,
        customs_document: Some(CustomsDocument {
            code: "BC23".to_string(),
            number: format!("BC-{}", wms_id),
            date: on,
        }),
        counterparty: Some("PT Supplier".to_string()),
        items,
    }
}

pub fn transmission_config() -> TransmissionConfig {
    TransmissionConfig {
        max_batch_size: 10,
        stale_claim_secs: 300,
    }
}

pub fn test_config() -> Config {
    let endpoints = InswEndpoints {
        initial_balance: "http://insw.invalid/saldo-awal".to_string(),
        transaction: "http://insw.invalid/transaksi".to_string(),
        document_detail: "http://insw.invalid/dokumen".to_string(),
    };
    Config {
        environment: "test".to_string(),
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        insw: InswConfig {
            mode: InswMode::Test,
            api_key: "key".to_string(),
            secret_key: "secret".to_string(),
            timeout_secs: 5,
            test: endpoints.clone(),
            real: endpoints,
        },
        transmission: transmission_config(),
    }
}

pub fn app_state(store: Arc<MemoryStore>, gateway: Arc<ScriptedGateway>) -> AppState {
    AppState {
        store: store as Arc<dyn Store>,
        insw: gateway as Arc<dyn InswGateway>,
        config: Arc::new(test_config()),
    }
}

/// Gateway that accepts everything except payloads whose WMS id was told to fail
#[derive(Default)]
pub struct ScriptedGateway {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(InswCategory, Value)>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, wms_id: &str) {
        self.failing.lock().unwrap().insert(wms_id.to_string());
    }

    pub fn recover(&self, wms_id: &str) {
        self.failing.lock().unwrap().remove(wms_id);
    }

    pub fn calls(&self) -> Vec<(InswCategory, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InswGateway for ScriptedGateway {
    async fn send(&self, category: InswCategory, payload: &InswPayload) -> Result<Value, GatewayError> {
        let body = serde_json::to_value(payload).unwrap();
        self.calls.lock().unwrap().push((category, body.clone()));

        let wms_id = body["wmsId"].as_str().unwrap_or_default().to_string();
        if self.failing.lock().unwrap().contains(&wms_id) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        Ok(json!({ "status": "OK", "wmsId": wms_id }))
    }

    async fn document_detail(&self, number: &str) -> Result<Value, GatewayError> {
        Ok(json!({ "nomorDokumen": number, "status": "APPROVED" }))
    }
}
