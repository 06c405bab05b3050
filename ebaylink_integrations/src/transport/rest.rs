//! eBay REST transport (Fulfillment, Inventory and Taxonomy APIs).

use crate::entities::{CATEGORY, PARTNER, PRODUCT, SALE_ORDER, SALE_ORDER_LINE};
use crate::transport::normalize::{
    flatten_categories, inventory_body, order_record, product_record, subtree_root,
    CategorySubtree, CategoryTree, EbayOrder, InventoryItem, InventoryPage, OrderPage,
};
use async_trait::async_trait;
use ebaylink_core::{
    BackendConfig, EntityType, Error, ExternalId, ExternalRecord, FieldValues, Filters, Result,
    SearchHit, Transport, TransportFactory,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const ORDER_PAGE_SIZE: u32 = 200;
const INVENTORY_PAGE_SIZE: u32 = 100;
const ERROR_BODY_LIMIT: usize = 512;

pub(crate) fn request_error(context: String, e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        Error::connectivity(context, e)
    } else {
        Error::backend(context, e)
    }
}

/// 404 is `NotFound`, throttling and 5xx are retryable, other rejections are fatal.
pub(crate) async fn check_status(context: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().await.unwrap_or_default();
    body.truncate(ERROR_BODY_LIMIT);
    Err(status_error(context, status, &body))
}

pub(crate) fn status_error(context: &str, status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(context.to_string()),
        StatusCode::TOO_MANY_REQUESTS => Error::Unavailable(format!("{context}: throttled")),
        s if s.is_server_error() => Error::Unavailable(format!("{context}: {s} {body}")),
        s => Error::Validation(format!("{context}: rejected with {s}: {body}")),
    }
}

fn filter_str<'a>(filters: &'a Filters, key: &str) -> Option<&'a str> {
    filters.get(key).and_then(Value::as_str)
}

/// Fulfillment API `filter` parameter from the scheduler's window filters.
pub(crate) fn order_filter(filters: &Filters) -> Option<String> {
    let range = |from: &str, to: &str| match (filter_str(filters, from), filter_str(filters, to)) {
        (None, None) => None,
        (f, t) => Some(format!("[{}..{}]", f.unwrap_or(""), t.unwrap_or(""))),
    };
    if let Some(r) = range("ModTimeFrom", "ModTimeTo") {
        return Some(format!("lastmodifieddate:{r}"));
    }
    range("CreateTimeFrom", "CreateTimeTo").map(|r| format!("creationdate:{r}"))
}

fn pick(record: ExternalRecord, attributes: &[String]) -> ExternalRecord {
    if attributes.is_empty() {
        return record;
    }
    ExternalRecord::from_map(
        record
            .as_map()
            .iter()
            .filter(|(k, _)| attributes.iter().any(|a| a == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

/// One authenticated session against the eBay REST APIs for a backend.
#[derive(Clone)]
pub struct EbayRestTransport {
    client: Client,
    api_base: String,
    token: String,
    category_tree_id: String,
}

impl EbayRestTransport {
    pub fn new(backend: &BackendConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::backend("build reqwest client", e))?;
        Ok(Self {
            client,
            api_base: backend.api_base.trim_end_matches('/').to_string(),
            token: backend.credentials.token.clone(),
            category_tree_id: backend.category_tree_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| request_error(format!("GET {path}"), e))?;
        let resp = check_status(&format!("GET {path}"), resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::backend(format!("decode {path}"), e))
    }

    async fn search_orders(&self, filters: &Filters) -> Result<Vec<SearchHit>> {
        let filter = order_filter(filters);
        let mut hits = Vec::new();
        let mut offset = 0u32;
        loop {
            let mut query = vec![
                ("limit", ORDER_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            if let Some(f) = &filter {
                query.push(("filter", f.clone()));
            }
            let page: OrderPage = self.get_json("/sell/fulfillment/v1/order", &query).await?;
            let count = page.orders.len() as u32;
            for order in &page.orders {
                let (id, record) = order_record(order)?;
                hits.push(SearchHit::with_record(id, record));
            }
            offset += count;
            let more = page.next.is_some() && page.total.map_or(true, |t| offset < t);
            if count == 0 || !more {
                return Ok(hits);
            }
        }
    }

    async fn search_products(&self) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        let mut offset = 0u32;
        loop {
            let query = [
                ("limit", INVENTORY_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: InventoryPage = self
                .get_json("/sell/inventory/v1/inventory_item", &query)
                .await?;
            let count = page.inventory_items.len() as u32;
            for item in &page.inventory_items {
                let (id, record) = product_record(item)?;
                hits.push(SearchHit::with_record(id, record));
            }
            offset += count;
            let more = page.next.is_some() && page.total.map_or(true, |t| offset < t);
            if count == 0 || !more {
                return Ok(hits);
            }
        }
    }

    fn tree_id<'a>(&'a self, filters: &'a Filters) -> &'a str {
        filter_str(filters, "category_tree_id").unwrap_or(self.category_tree_id.as_str())
    }

    async fn put_inventory_item(&self, sku: &str, data: &FieldValues) -> Result<()> {
        let path = format!("/sell/inventory/v1/inventory_item/{sku}");
        let resp = self
            .client
            .put(self.url(&path))
            .bearer_auth(&self.token)
            .header("Content-Language", "en-US")
            .json(&inventory_body(sku, data))
            .send()
            .await
            .map_err(|e| request_error(format!("PUT {path}"), e))?;
        check_status(&format!("PUT {path}"), resp).await?;
        Ok(())
    }
}

fn unsupported(op: &str, entity_type: &EntityType) -> Error {
    Error::InvalidInput(format!("{op} is not supported for {entity_type}"))
}

#[async_trait]
impl Transport for EbayRestTransport {
    #[instrument(level = "debug", skip(self, filters))]
    async fn search(&self, entity_type: &EntityType, filters: &Filters) -> Result<Vec<SearchHit>> {
        if *entity_type == SALE_ORDER {
            self.search_orders(filters).await
        } else if *entity_type == PRODUCT {
            self.search_products().await
        } else if *entity_type == CATEGORY {
            let path = format!("/commerce/taxonomy/v1/category_tree/{}", self.tree_id(filters));
            let tree: CategoryTree = self.get_json(&path, &[]).await?;
            Ok(flatten_categories(&tree)?
                .into_iter()
                .map(|(id, record)| SearchHit::with_record(id, record))
                .collect())
        } else {
            Err(unsupported("search", entity_type))
        }
    }

    #[instrument(level = "debug", skip(self, attributes))]
    async fn read(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        attributes: &[String],
    ) -> Result<ExternalRecord> {
        let record = if *entity_type == SALE_ORDER {
            let order: EbayOrder = self
                .get_json(&format!("/sell/fulfillment/v1/order/{external_id}"), &[])
                .await?;
            order_record(&order)?.1
        } else if *entity_type == PRODUCT {
            let item: InventoryItem = self
                .get_json(&format!("/sell/inventory/v1/inventory_item/{external_id}"), &[])
                .await?;
            product_record(&item)?.1
        } else if *entity_type == CATEGORY {
            let path = format!(
                "/commerce/taxonomy/v1/category_tree/{}/get_category_subtree",
                self.category_tree_id
            );
            let subtree: CategorySubtree = self
                .get_json(&path, &[("category_id", external_id.to_string())])
                .await?;
            subtree_root(&subtree)?
        } else if *entity_type == PARTNER || *entity_type == SALE_ORDER_LINE {
            // Only ever embedded in an order.
            return Err(Error::NotFound(format!(
                "{entity_type} '{external_id}' has no endpoint of its own"
            )));
        } else {
            return Err(unsupported("read", entity_type));
        };
        Ok(pick(record, attributes))
    }

    #[instrument(level = "debug", skip(self, data))]
    async fn create(&self, entity_type: &EntityType, data: &FieldValues) -> Result<ExternalId> {
        if *entity_type != PRODUCT {
            return Err(unsupported("create", entity_type));
        }
        let sku = data
            .get("SKU")
            .and_then(ExternalId::from_json)
            .ok_or_else(|| Error::missing_field(entity_type.as_str(), "SKU"))?;
        self.put_inventory_item(sku.as_str(), data).await?;
        Ok(sku)
    }

    #[instrument(level = "debug", skip(self, data))]
    async fn update(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        data: &FieldValues,
    ) -> Result<()> {
        if *entity_type != PRODUCT {
            return Err(unsupported("update", entity_type));
        }
        // Create-or-replace: merge onto the current item so partial exports keep other fields.
        let current = self.read(entity_type, external_id, &[]).await?;
        let mut merged = current.as_map().clone();
        for (k, v) in data {
            merged.insert(k.clone(), v.clone());
        }
        self.put_inventory_item(external_id.as_str(), &merged).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete(&self, entity_type: &EntityType, external_id: &ExternalId) -> Result<()> {
        if *entity_type != PRODUCT {
            return Err(unsupported("delete", entity_type));
        }
        let path = format!("/sell/inventory/v1/inventory_item/{external_id}");
        let resp = self
            .client
            .delete(self.url(&path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| request_error(format!("DELETE {path}"), e))?;
        check_status(&format!("DELETE {path}"), resp).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_asset(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(format!("GET {url}"), e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(&format!("GET {url}"), resp).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| request_error(format!("read {url}"), e))?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Opens one [`EbayRestTransport`] per work context.
#[derive(Debug, Clone)]
pub struct EbayTransportFactory {
    timeout: Duration,
}

impl EbayTransportFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TransportFactory for EbayTransportFactory {
    #[instrument(level = "debug", skip(self, backend), fields(backend = %backend.id))]
    async fn open(&self, backend: &BackendConfig) -> Result<Arc<dyn Transport>> {
        backend.validate()?;
        Ok(Arc::new(EbayRestTransport::new(backend, self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(v: Value) -> Filters {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn window_filters_become_fulfillment_filter() {
        let created = filters(json!({
            "CreateTimeFrom": "2024-03-01T06:00:00Z",
            "CreateTimeTo": "2024-03-01T09:58:00Z",
        }));
        assert_eq!(
            order_filter(&created).as_deref(),
            Some("creationdate:[2024-03-01T06:00:00Z..2024-03-01T09:58:00Z]")
        );
        let modified = filters(json!({"ModTimeFrom": "2024-03-01T06:00:00Z"}));
        assert_eq!(
            order_filter(&modified).as_deref(),
            Some("lastmodifieddate:[2024-03-01T06:00:00Z..]")
        );
        assert_eq!(order_filter(&Filters::new()), None);
    }

    #[test]
    fn statuses_map_onto_the_error_taxonomy() {
        assert!(matches!(
            status_error("GET x", StatusCode::NOT_FOUND, ""),
            Error::NotFound(_)
        ));
        let throttled = status_error("GET x", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(throttled.is_retryable());
        assert!(status_error("GET x", StatusCode::BAD_GATEWAY, "").is_retryable());
        let rejected = status_error("GET x", StatusCode::BAD_REQUEST, "bad filter");
        assert!(matches!(rejected, Error::Validation(_)));
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn read_attributes_pick_top_level_keys() {
        let rec = ExternalRecord::new(json!({"SKU": "A", "Title": "Mug", "Quantity": 2})).unwrap();
        let picked = pick(rec, &["Title".to_string()]);
        assert_eq!(picked.to_value(), json!({"Title": "Mug"}));
    }
}
