use crate::models::BackendId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_API_BASE: &str = "https://api.ebay.com";
pub const SANDBOX_API_BASE: &str = "https://api.sandbox.ebay.com";
pub const DEFAULT_SALE_PREFIX: &str = "eby-";

/// Application keys and user token for one marketplace account.
///
/// Token refresh is handled outside the connector; the stored token is used as-is.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCredentials {
    pub client_id: String,
    pub dev_id: String,
    pub client_secret: String,
    pub token: String,
    pub token_valid_until: Option<DateTime<Utc>>,
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("client_id", &self.client_id)
            .field("dev_id", &self.dev_id)
            .field("client_secret", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("token_valid_until", &self.token_valid_until)
            .finish()
    }
}

impl BackendCredentials {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("client_id", &self.client_id),
            ("dev_id", &self.dev_id),
            ("client_secret", &self.client_secret),
            ("token", &self.token),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("credential {name} is empty")));
            }
        }
        Ok(())
    }
}

/// One configured marketplace account and its sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: BackendId,
    pub name: String,
    pub api_base: String,
    pub credentials: BackendCredentials,
    pub is_test: bool,
    pub enabled: bool,
    /// Prepended to imported sale order names (`eby-` + order id).
    pub sale_prefix: Option<String>,
    /// Warehouse code for merchant-fulfilled orders.
    pub warehouse: String,
    /// Warehouse code for marketplace-fulfilled orders.
    pub fba_warehouse: Option<String>,
    pub team: Option<String>,
    /// Category tree used by the taxonomy import.
    pub category_tree_id: String,
    pub import_sales_from_date: Option<DateTime<Utc>>,
    pub import_updated_sales_from_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackendConfig {
    #[tracing::instrument(level = "debug", skip(credentials))]
    pub fn new(
        name: impl Into<String> + fmt::Debug,
        warehouse: impl Into<String> + fmt::Debug,
        credentials: BackendCredentials,
        is_test: bool,
    ) -> Result<Self> {
        let now = Utc::now();
        let backend = Self {
            id: BackendId::new(),
            name: name.into(),
            api_base: if is_test {
                SANDBOX_API_BASE.to_string()
            } else {
                DEFAULT_API_BASE.to_string()
            },
            credentials,
            is_test,
            enabled: true,
            sale_prefix: Some(DEFAULT_SALE_PREFIX.to_string()),
            warehouse: warehouse.into(),
            fba_warehouse: None,
            team: None,
            category_tree_id: "0".to_string(),
            import_sales_from_date: None,
            import_updated_sales_from_date: None,
            created_at: now,
            updated_at: now,
        };
        backend.validate()?;
        Ok(backend)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("backend name is empty".to_string()));
        }
        if self.warehouse.trim().is_empty() {
            return Err(Error::InvalidInput("backend warehouse is empty".to_string()));
        }
        if self.api_base.trim().is_empty() {
            return Err(Error::InvalidInput("backend api_base is empty".to_string()));
        }
        self.credentials.validate()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
pub(crate) fn test_backend() -> BackendConfig {
    BackendConfig::new(
        "test shop",
        "WH",
        BackendCredentials {
            client_id: "client".into(),
            dev_id: "dev".into(),
            client_secret: "secret".into(),
            token: "token".into(),
            token_valid_until: None,
        },
        true,
    )
    .expect("valid test backend")
}
