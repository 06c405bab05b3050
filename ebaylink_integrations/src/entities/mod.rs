//! eBay binding models and their import/export behavior.

pub mod category;
pub mod partner;
pub mod product;
pub mod sale_order;
pub mod sale_order_line;

use ebaylink_core::{EntityType, Registry, Result};

pub static PARTNER: EntityType = EntityType::from_static("ebay.res.partner");
pub static PRODUCT: EntityType = EntityType::from_static("ebay.product.product");
pub static SALE_ORDER: EntityType = EntityType::from_static("ebay.sale.order");
pub static SALE_ORDER_LINE: EntityType = EntityType::from_static("ebay.sale.order.line");
pub static CATEGORY: EntityType = EntityType::from_static("ebay.config.product.category");

pub static HOST_PARTNER: EntityType = EntityType::from_static("res.partner");
pub static HOST_PRODUCT: EntityType = EntityType::from_static("product.product");
pub static HOST_SALE_ORDER: EntityType = EntityType::from_static("sale.order");
pub static HOST_SALE_ORDER_LINE: EntityType = EntityType::from_static("sale.order.line");

/// Every eBay entity the connector syncs.
pub fn registry() -> Result<Registry> {
    Registry::builder()
        .importer(partner::PartnerImporter::new())
        .importer(product::ProductImporter::new())
        .importer(sale_order::SaleOrderImporter::new())
        .importer(sale_order_line::SaleOrderLineImporter::new())
        .importer(category::CategoryImporter::new())
        .exporter(product::exporter())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebaylink_core::backend::memory::MemoryBackendStore;
    use ebaylink_core::binding::memory::MemoryBindingStore;
    use ebaylink_core::persistence::memory::MemoryEntityStore;
    use ebaylink_core::tasks::memory::MemoryTaskQueue;
    use ebaylink_core::transport::memory::{InjectedFailure, MemoryTransport, MemoryTransportFactory};
    use ebaylink_core::{
        BackendConfig, BackendCredentials, BackendStore, BatchMode, Connector, ConnectorConfig,
        ConnectorDeps, EntityStore, Error, ExportAction, ExternalId, ExternalRecord, Filters,
        ImportAction, TaskQueue,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Shop {
        connector: Arc<Connector>,
        transport: MemoryTransport,
        entities: MemoryEntityStore,
        queue: MemoryTaskQueue,
        backend: BackendConfig,
    }

    async fn shop() -> Shop {
        let transport = MemoryTransport::new();
        let entities = MemoryEntityStore::new();
        let queue = MemoryTaskQueue::new();
        let backends = MemoryBackendStore::new();
        let mut backend = BackendConfig::new(
            "shop",
            "WH-MAIN",
            BackendCredentials {
                client_id: "c".into(),
                dev_id: "d".into(),
                client_secret: "s".into(),
                token: "t".into(),
                token_valid_until: None,
            },
            true,
        )
        .unwrap();
        backend.fba_warehouse = Some("WH-FBA".into());
        backends.upsert(&backend).await.unwrap();

        let deps = ConnectorDeps::new(
            Arc::new(backends),
            Arc::new(MemoryBindingStore::new()),
            Arc::new(entities.clone()),
            Arc::new(queue.clone()),
            Arc::new(MemoryTransportFactory::new(transport.clone())),
        );
        let config = ConnectorConfig {
            batch_mode: BatchMode::Direct,
            retry_backoff_base_ms: 1,
            retry_backoff_max_ms: 2,
            worker_poll_interval_ms: 1,
            ..Default::default()
        };
        Shop {
            connector: Arc::new(Connector::new(deps, registry().unwrap(), config).unwrap()),
            transport,
            entities,
            queue,
            backend,
        }
    }

    fn rec(v: Value) -> ExternalRecord {
        ExternalRecord::new(v).unwrap()
    }

    fn product(sku: &str, title: &str) -> ExternalRecord {
        rec(json!({"SKU": sku, "Title": title, "Quantity": 4, "url_images": []}))
    }

    fn order(id: &str, channel: &str) -> ExternalRecord {
        rec(json!({
            "order_id": id,
            "date_order": "2024-03-01T09:00:00.000Z",
            "currency": "eur",
            "FulfillmentChannel": channel,
            "buyer": {
                "email": "ann@example.com",
                "name": "Ann Smith",
                "city": "Paris",
                "country": "fr",
            },
            "lines": [
                {"item_id": "L1", "sku": "MUG-1", "name": "Mug", "qty_ordered": 2,
                 "item_price": 20.0, "ship_price": 5.0, "price_unit": 10.0},
                {"item_id": "L2", "sku": "CAP-1", "name": "Cap", "qty_ordered": 1,
                 "item_price": 2.5, "ship_price": 0.0},
            ],
        }))
    }

    fn field<'a>(fields: &'a ebaylink_core::FieldValues, key: &str) -> &'a Value {
        fields.get(key).unwrap_or(&Value::Null)
    }

    #[tokio::test]
    async fn order_imports_buyer_products_and_lines() {
        let s = shop().await;
        s.transport.put(&PRODUCT, "MUG-1", product("MUG-1", "Mug")).unwrap();
        s.transport.put(&PRODUCT, "CAP-1", product("CAP-1", "Cap")).unwrap();
        s.transport.put(&SALE_ORDER, "O-1", order("O-1", "MFN")).unwrap();

        let outcome = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &ExternalId::new("O-1"), false)
            .await
            .unwrap();
        assert_eq!(outcome.action, ImportAction::Created);
        assert_eq!(outcome.children.len(), 2);

        let order_id = outcome.internal_id.unwrap();
        let order = s.entities.get(&HOST_SALE_ORDER, order_id).await.unwrap().unwrap();
        assert_eq!(field(&order.fields, "name"), &json!("eby-O-1"));
        assert_eq!(field(&order.fields, "warehouse"), &json!("WH-MAIN"));
        assert_eq!(field(&order.fields, "currency_code"), &json!("EUR"));
        assert_eq!(field(&order.fields, "total_product_amount"), &json!(22.5));
        assert_eq!(field(&order.fields, "total_ship_amount"), &json!(5.0));
        assert_eq!(field(&order.fields, "total_amount"), &json!(27.5));
        assert_eq!(field(&order.fields, "order_line"), &json!([]));
        let partner_id = field(&order.fields, "partner_id").clone();
        assert_eq!(field(&order.fields, "partner_invoice_id"), &partner_id);
        assert_eq!(field(&order.fields, "partner_shipping_id"), &partner_id);

        let partners = s
            .entities
            .search(&HOST_PARTNER, "email", &json!("ann@example.com"))
            .await
            .unwrap();
        assert_eq!(partners.len(), 1);
        assert_eq!(field(&partners[0].fields, "type"), &json!("delivery"));
        assert_eq!(field(&partners[0].fields, "country_code"), &json!("FR"));
        assert_eq!(partners[0].fields.get("state"), Some(&Value::Null));

        let lines = s
            .entities
            .search(&HOST_SALE_ORDER_LINE, "order_id", &json!(order_id.to_string()))
            .await
            .unwrap();
        assert_eq!(lines.len(), 2);
        let cap = lines.iter().find(|l| field(&l.fields, "name") == &json!("Cap")).unwrap();
        assert_eq!(field(&cap.fields, "price_unit"), &json!(2.5));
        assert_eq!(s.entities.count(&HOST_PRODUCT).await, 2);
    }

    #[tokio::test]
    async fn imported_order_is_skipped_unless_forced() {
        let s = shop().await;
        s.transport.put(&PRODUCT, "MUG-1", product("MUG-1", "Mug")).unwrap();
        s.transport.put(&PRODUCT, "CAP-1", product("CAP-1", "Cap")).unwrap();
        s.transport.put(&SALE_ORDER, "O-1", order("O-1", "MFN")).unwrap();
        let id = ExternalId::new("O-1");

        s.connector
            .import_record(s.backend.id, &SALE_ORDER, &id, false)
            .await
            .unwrap();
        let again = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &id, false)
            .await
            .unwrap();
        assert!(matches!(again.action, ImportAction::Skipped { ref reason } if reason == "Already imported"));

        let forced = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &id, true)
            .await
            .unwrap();
        assert_eq!(forced.action, ImportAction::Unchanged);
        assert_eq!(s.entities.count(&HOST_SALE_ORDER).await, 1);
    }

    #[tokio::test]
    async fn new_backend_imports_the_product_catalog() {
        let s = shop().await;
        s.transport.put(&PRODUCT, "MUG-1", product("MUG-1", "Mug")).unwrap();
        s.transport.put(&PRODUCT, "CAP-1", product("CAP-1", "Cap")).unwrap();

        let mut second = s.backend.clone();
        second.id = ebaylink_core::BackendId::new();
        second.name = "second shop".into();
        let report = s
            .connector
            .create_backend(&second, &PRODUCT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(s.entities.count(&HOST_PRODUCT).await, 2);
        assert_eq!(
            s.transport.searches().unwrap(),
            vec![(PRODUCT.clone(), Filters::new())]
        );
    }

    #[tokio::test]
    async fn order_with_a_failed_line_resumes_on_retry() {
        let s = shop().await;
        s.transport.put(&PRODUCT, "MUG-1", product("MUG-1", "Mug")).unwrap();
        s.transport.put(&PRODUCT, "CAP-1", product("CAP-1", "Cap")).unwrap();
        let unpriced = rec(json!({
            "order_id": "O-5",
            "date_order": "2024-03-01T09:00:00.000Z",
            "currency": "eur",
            "FulfillmentChannel": "MFN",
            "buyer": {"email": "ann@example.com", "name": "Ann Smith"},
            "lines": [
                {"item_id": "L1", "sku": "MUG-1", "name": "Mug", "qty_ordered": 2,
                 "item_price": 20.0, "ship_price": 5.0, "price_unit": 10.0},
                {"item_id": "L2", "sku": "CAP-1", "name": "Cap", "qty_ordered": 1,
                 "ship_price": 0.0},
            ],
        }));
        s.transport.put(&SALE_ORDER, "O-5", unpriced).unwrap();
        let id = ExternalId::new("O-5");

        let err = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingField { ref field, .. } if field == "price_unit"));
        assert_eq!(s.entities.count(&HOST_SALE_ORDER).await, 1);
        assert_eq!(s.entities.count(&HOST_SALE_ORDER_LINE).await, 1);

        s.transport.put(&SALE_ORDER, "O-5", order("O-5", "MFN")).unwrap();
        let retried = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &id, false)
            .await
            .unwrap();
        assert!(!matches!(retried.action, ImportAction::Skipped { .. }));
        assert_eq!(retried.children.len(), 2);
        assert_eq!(retried.children[1].action, ImportAction::Created);
        assert_eq!(s.entities.count(&HOST_SALE_ORDER).await, 1);
        assert_eq!(s.entities.count(&HOST_SALE_ORDER_LINE).await, 2);

        let done = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &id, false)
            .await
            .unwrap();
        assert!(matches!(done.action, ImportAction::Skipped { .. }));
    }

    #[tokio::test]
    async fn marketplace_fulfilled_order_uses_fba_warehouse() {
        let s = shop().await;
        s.transport.put(&PRODUCT, "MUG-1", product("MUG-1", "Mug")).unwrap();
        s.transport.put(&PRODUCT, "CAP-1", product("CAP-1", "Cap")).unwrap();
        s.transport.put(&SALE_ORDER, "O-2", order("O-2", "AFN")).unwrap();

        let outcome = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &ExternalId::new("O-2"), false)
            .await
            .unwrap();
        let order = s
            .entities
            .get(&HOST_SALE_ORDER, outcome.internal_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(field(&order.fields, "fba_warehouse"), &json!("WH-FBA"));
        assert!(order.fields.get("warehouse").is_none());
    }

    #[tokio::test]
    async fn missing_product_fails_the_order_without_partial_writes() {
        let s = shop().await;
        s.transport.put(&PRODUCT, "MUG-1", product("MUG-1", "Mug")).unwrap();
        s.transport
            .fail_read(&PRODUCT, "CAP-1", InjectedFailure::Connectivity)
            .unwrap();
        s.transport.put(&SALE_ORDER, "O-3", order("O-3", "MFN")).unwrap();

        let err = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &ExternalId::new("O-3"), false)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(s.entities.count(&HOST_SALE_ORDER).await, 0);
        assert_eq!(s.entities.count(&HOST_SALE_ORDER_LINE).await, 0);
    }

    #[tokio::test]
    async fn partner_adopts_existing_customer_with_same_email() {
        let s = shop().await;
        let existing = s
            .entities
            .create(
                &HOST_PARTNER,
                json!({"email": "ann@example.com", "customer": true, "is_company": false,
                       "name": "Ann (ERP)"})
                .as_object()
                .cloned()
                .unwrap(),
            )
            .await
            .unwrap();
        s.transport.put(&PRODUCT, "MUG-1", product("MUG-1", "Mug")).unwrap();
        s.transport.put(&PRODUCT, "CAP-1", product("CAP-1", "Cap")).unwrap();
        s.transport.put(&SALE_ORDER, "O-4", order("O-4", "MFN")).unwrap();

        let outcome = s
            .connector
            .import_record(s.backend.id, &SALE_ORDER, &ExternalId::new("O-4"), false)
            .await
            .unwrap();
        let order = s
            .entities
            .get(&HOST_SALE_ORDER, outcome.internal_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            field(&order.fields, "partner_id"),
            &json!(existing.id.to_string())
        );
        assert_eq!(s.entities.count(&HOST_PARTNER).await, 1);
    }

    #[tokio::test]
    async fn product_image_is_downloaded_and_missing_ones_skipped() {
        let s = shop().await;
        s.transport
            .put(
                &PRODUCT,
                "MUG-1",
                rec(json!({
                    "SKU": "MUG-1", "Title": "Mug",
                    "url_images": ["https://img/1.jpg", "https://img/gone.jpg", "https://img/err.jpg"],
                })),
            )
            .unwrap();
        s.transport.put_asset("https://img/1.jpg", b"jpeg".to_vec()).unwrap();
        s.transport
            .fail_asset("https://img/gone.jpg", InjectedFailure::NotFound)
            .unwrap();
        s.transport
            .fail_asset("https://img/err.jpg", InjectedFailure::Unavailable)
            .unwrap();

        let outcome = s
            .connector
            .import_record(s.backend.id, &PRODUCT, &ExternalId::new("MUG-1"), false)
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        let stored = s
            .entities
            .get(&HOST_PRODUCT, outcome.internal_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(field(&stored.fields, "image"), &json!("anBlZw=="));
        assert_eq!(field(&stored.fields, "type"), &json!("product"));
    }

    #[tokio::test]
    async fn product_without_title_is_rejected() {
        let s = shop().await;
        s.transport
            .put(&PRODUCT, "X-1", rec(json!({"SKU": "X-1", "Title": " "})))
            .unwrap();
        let err = s
            .connector
            .import_record(s.backend.id, &PRODUCT, &ExternalId::new("X-1"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(s.entities.count(&HOST_PRODUCT).await, 0);
    }

    #[tokio::test]
    async fn categories_are_delayed_and_link_their_parent() {
        let s = shop().await;
        s.transport.embed_records_in_search(true).unwrap();
        for (id, parent, level) in [("0", Value::Null, 0), ("20081", json!("0"), 1), ("37903", json!("20081"), 2)] {
            s.transport
                .put(
                    &CATEGORY,
                    id,
                    rec(json!({"id_category": id, "name": format!("cat {id}"),
                               "parent_category_id": parent, "level": level,
                               "is_leaf_category": level == 2})),
                )
                .unwrap();
        }

        let report = s
            .connector
            .import_batch(s.backend.id, &CATEGORY, Filters::new())
            .await
            .unwrap();
        assert_eq!(report.mode, BatchMode::Delayed);
        assert_eq!(report.scheduled, 3);
        assert_eq!(s.queue.pending().await.unwrap(), 3);

        let worked = s.connector.worker().unwrap().drain().await.unwrap();
        assert_eq!(worked.completed, 3);
        assert_eq!(s.entities.count(&CATEGORY).await, 3);

        let leaf = s
            .entities
            .search(&CATEGORY, "id_category", &json!("37903"))
            .await
            .unwrap();
        let parent = s
            .entities
            .search(&CATEGORY, "id_category", &json!("20081"))
            .await
            .unwrap();
        assert_eq!(
            field(&leaf[0].fields, "parent_category_id"),
            &json!(parent[0].id.to_string())
        );
        let root = s
            .entities
            .search(&CATEGORY, "id_category", &json!("0"))
            .await
            .unwrap();
        assert_eq!(field(&root[0].fields, "parent_category_id"), &Value::Null);
    }

    #[tokio::test]
    async fn product_export_creates_then_updates_inventory_item() {
        let s = shop().await;
        let product = s
            .entities
            .create(
                &HOST_PRODUCT,
                json!({"sku": "NEW-1", "name": "Bowl", "ebay_qty": 7})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();

        let created = s
            .connector
            .export_record(s.backend.id, &PRODUCT, product.id, None)
            .await
            .unwrap();
        assert_eq!(created.action, ExportAction::Created);

        let updated = s
            .connector
            .export_record(s.backend.id, &PRODUCT, product.id, Some(vec!["ebay_qty".into()]))
            .await
            .unwrap();
        assert_eq!(updated.action, ExportAction::Updated);
        assert_eq!(updated.external_id, created.external_id);

        let err = s
            .connector
            .export_record(s.backend.id, &SALE_ORDER, product.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
