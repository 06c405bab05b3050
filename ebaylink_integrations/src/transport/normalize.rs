//! eBay REST payloads and their flattening into external records.
//!
//! Records use the field names the entity mappers read (`order_id`, `buyer`, `lines`,
//! `SKU`, `Title`, ...), so a mapper never sees raw eBay JSON.

use ebaylink_core::{Error, ExternalId, ExternalRecord, FieldValues, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub value: String,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Amount {
    fn parse(&self) -> Result<f64> {
        self.value
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Validation(format!("invalid amount '{}'", self.value)))
    }
}

fn amount(a: Option<&Amount>) -> Result<f64> {
    a.map(Amount::parse).transpose().map(|v| v.unwrap_or(0.0))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub address_line3: Option<String>,
    pub city: Option<String>,
    pub state_or_province: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phone {
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub full_name: Option<String>,
    pub contact_address: Option<Address>,
    pub primary_phone: Option<Phone>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub username: Option<String>,
    pub buyer_registration_address: Option<Contact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingStep {
    pub shipping_service_code: Option<String>,
    pub ship_to: Option<Contact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentStartInstruction {
    #[serde(default)]
    pub ebay_supported_fulfillment: bool,
    pub min_estimated_delivery_date: Option<String>,
    pub max_estimated_delivery_date: Option<String>,
    pub shipping_step: Option<ShippingStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemFulfillment {
    pub ship_by_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDeliveryCost {
    pub shipping_cost: Option<Amount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub line_item_id: String,
    pub sku: Option<String>,
    pub legacy_item_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quantity: u32,
    pub line_item_cost: Option<Amount>,
    pub delivery_cost: Option<LineDeliveryCost>,
    pub line_item_fulfillment_instructions: Option<LineItemFulfillment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSummary {
    pub total: Option<Amount>,
    pub price_subtotal: Option<Amount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EbayOrder {
    pub order_id: String,
    pub creation_date: Option<String>,
    pub last_modified_date: Option<String>,
    #[serde(default)]
    pub buyer: Buyer,
    pub pricing_summary: Option<PricingSummary>,
    #[serde(default)]
    pub fulfillment_start_instructions: Vec<FulfillmentStartInstruction>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    #[serde(default)]
    pub orders: Vec<EbayOrder>,
    pub total: Option<u32>,
    pub next: Option<String>,
}

fn buyer_block(order: &EbayOrder, instruction: Option<&FulfillmentStartInstruction>) -> Result<Value> {
    let registration = order.buyer.buyer_registration_address.clone().unwrap_or_default();
    let ship_to = instruction
        .and_then(|i| i.shipping_step.as_ref())
        .and_then(|s| s.ship_to.clone())
        .unwrap_or_default();
    let email = ship_to
        .email
        .clone()
        .or(registration.email.clone())
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| Error::missing_field("ebay.sale.order", "buyer.email"))?;
    let address = ship_to
        .contact_address
        .clone()
        .or(registration.contact_address.clone())
        .unwrap_or_default();
    let phone = ship_to
        .primary_phone
        .as_ref()
        .or(registration.primary_phone.as_ref())
        .and_then(|p| p.phone_number.clone());
    Ok(json!({
        "email": email,
        "name": ship_to.full_name.or(registration.full_name),
        "alias": order.buyer.username,
        "phone": phone,
        "street": address.address_line1,
        "street2": address.address_line2,
        "street3": address.address_line3,
        "city": address.city,
        "zip": address.postal_code,
        "country": address.country_code,
        "state": address.state_or_province,
    }))
}

fn line_record(line: &LineItem) -> Result<Value> {
    let item_price = amount(line.line_item_cost.as_ref())?;
    let ship_price = amount(
        line.delivery_cost
            .as_ref()
            .and_then(|d| d.shipping_cost.as_ref()),
    )?;
    let price_unit = if line.quantity > 0 {
        Some(item_price / f64::from(line.quantity))
    } else {
        None
    };
    Ok(json!({
        "item_id": line.line_item_id,
        "sku": line.sku,
        "listing_id": line.legacy_item_id,
        "name": line.title,
        "qty_ordered": line.quantity,
        "item_price": item_price,
        "ship_price": ship_price,
        "price_unit": price_unit,
        "ship_by_date": line
            .line_item_fulfillment_instructions
            .as_ref()
            .and_then(|f| f.ship_by_date.clone()),
    }))
}

/// Flatten an eBay order into the record the sale order importer reads.
pub fn order_record(order: &EbayOrder) -> Result<(ExternalId, ExternalRecord)> {
    let instruction = order.fulfillment_start_instructions.first();
    let lines = order
        .line_items
        .iter()
        .map(line_record)
        .collect::<Result<Vec<_>>>()?;
    let currency = order
        .pricing_summary
        .as_ref()
        .and_then(|p| p.total.as_ref().or(p.price_subtotal.as_ref()))
        .and_then(|a| a.currency.clone());
    let channel = instruction.map(|i| {
        if i.ebay_supported_fulfillment {
            "AFN"
        } else {
            "MFN"
        }
    });
    let latest_ship = order
        .line_items
        .iter()
        .filter_map(|l| {
            l.line_item_fulfillment_instructions
                .as_ref()
                .and_then(|f| f.ship_by_date.clone())
        })
        .min();

    let record = ExternalRecord::new(json!({
        "order_id": order.order_id,
        "date_order": order.creation_date,
        "last_modified": order.last_modified_date,
        "currency": currency,
        "FulfillmentChannel": channel,
        "ship_service_level": instruction
            .and_then(|i| i.shipping_step.as_ref())
            .and_then(|s| s.shipping_service_code.clone()),
        "earliest_delivery_date": instruction.and_then(|i| i.min_estimated_delivery_date.clone()),
        "latest_delivery_date": instruction.and_then(|i| i.max_estimated_delivery_date.clone()),
        "earliest_ship_date": order.creation_date,
        "latest_ship_date": latest_ship,
        "buyer": buyer_block(order, instruction)?,
        "lines": lines,
    }))?;
    Ok((ExternalId::new(order.order_id.clone()), record))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub category_id: String,
    #[serde(default)]
    pub category_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTreeNode {
    pub category: CategoryRef,
    #[serde(default)]
    pub category_tree_node_level: u32,
    #[serde(default)]
    pub leaf_category_tree_node: bool,
    pub parent_category_tree_node_href: Option<String>,
    #[serde(default)]
    pub child_category_tree_nodes: Vec<CategoryTreeNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTree {
    pub category_tree_id: String,
    pub root_category_node: CategoryTreeNode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySubtree {
    pub category_tree_id: String,
    pub category_subtree_node: CategoryTreeNode,
}

fn category_record(node: &CategoryTreeNode, parent: Option<&str>) -> Result<ExternalRecord> {
    ExternalRecord::new(json!({
        "id_category": node.category.category_id,
        "name": node.category.category_name,
        "parent_category_id": parent,
        "is_leaf_category": node.leaf_category_tree_node,
        "level": node.category_tree_node_level,
    }))
}

/// Depth-first flattening; parents come before their children.
pub fn flatten_categories(tree: &CategoryTree) -> Result<Vec<(ExternalId, ExternalRecord)>> {
    let mut out = Vec::new();
    let mut stack: Vec<(&CategoryTreeNode, Option<&str>)> = vec![(&tree.root_category_node, None)];
    while let Some((node, parent)) = stack.pop() {
        out.push((
            ExternalId::new(node.category.category_id.clone()),
            category_record(node, parent)?,
        ));
        for child in node.child_category_tree_nodes.iter().rev() {
            stack.push((child, Some(node.category.category_id.as_str())));
        }
    }
    Ok(out)
}

/// Subtree root as a single record. The parent id comes from the parent node href.
pub fn subtree_root(subtree: &CategorySubtree) -> Result<ExternalRecord> {
    let node = &subtree.category_subtree_node;
    let parent = node
        .parent_category_tree_node_href
        .as_deref()
        .and_then(category_id_from_href);
    category_record(node, parent.as_deref())
}

fn category_id_from_href(href: &str) -> Option<String> {
    let query = href.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == "category_id")
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryProduct {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipToLocationAvailability {
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub ship_to_location_availability: Option<ShipToLocationAvailability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub sku: String,
    #[serde(default)]
    pub product: Option<InventoryProduct>,
    #[serde(default)]
    pub availability: Option<Availability>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPage {
    #[serde(default)]
    pub inventory_items: Vec<InventoryItem>,
    pub total: Option<u32>,
    pub next: Option<String>,
}

pub fn product_record(item: &InventoryItem) -> Result<(ExternalId, ExternalRecord)> {
    let product = item.product.clone().unwrap_or_default();
    let quantity = item
        .availability
        .as_ref()
        .and_then(|a| a.ship_to_location_availability.as_ref())
        .and_then(|s| s.quantity);
    let record = ExternalRecord::new(json!({
        "SKU": item.sku,
        "Title": product.title,
        "Quantity": quantity,
        "url_images": product.image_urls,
    }))?;
    Ok((ExternalId::new(item.sku.clone()), record))
}

/// Inventory item body for a create-or-replace call, from exported field values.
pub fn inventory_body(sku: &str, data: &FieldValues) -> InventoryItem {
    let title = data.get("Title").and_then(Value::as_str).map(str::to_string);
    let quantity = data.get("Quantity").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f.round() as i64))
    });
    InventoryItem {
        sku: sku.to_string(),
        product: Some(InventoryProduct {
            title,
            image_urls: Vec::new(),
        }),
        availability: Some(Availability {
            ship_to_location_availability: Some(ShipToLocationAvailability { quantity }),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_json() -> Value {
        json!({
            "orderId": "12-34567-89012",
            "creationDate": "2024-03-01T09:00:00.000Z",
            "buyer": {
                "username": "ann_buys",
                "buyerRegistrationAddress": {
                    "fullName": "Ann Smith",
                    "email": "ann@example.com",
                    "contactAddress": {"city": "Lyon", "countryCode": "FR"}
                }
            },
            "pricingSummary": {"total": {"value": "27.50", "currency": "EUR"}},
            "fulfillmentStartInstructions": [{
                "ebaySupportedFulfillment": false,
                "maxEstimatedDeliveryDate": "2024-03-08T00:00:00.000Z",
                "shippingStep": {
                    "shippingServiceCode": "FR_Colissimo",
                    "shipTo": {
                        "fullName": "Ann Smith",
                        "contactAddress": {
                            "addressLine1": "1 Rue X",
                            "city": "Paris",
                            "postalCode": "75001",
                            "countryCode": "FR"
                        },
                        "primaryPhone": {"phoneNumber": "0102030405"}
                    }
                }
            }],
            "lineItems": [
                {
                    "lineItemId": "10001",
                    "sku": "MUG-1",
                    "title": "Mug",
                    "quantity": 2,
                    "lineItemCost": {"value": "20.00", "currency": "EUR"},
                    "deliveryCost": {"shippingCost": {"value": "5.00", "currency": "EUR"}},
                    "lineItemFulfillmentInstructions": {"shipByDate": "2024-03-03T00:00:00.000Z"}
                },
                {
                    "lineItemId": "10002",
                    "sku": "CAP-1",
                    "title": "Cap",
                    "quantity": 1,
                    "lineItemCost": {"value": "2.50", "currency": "EUR"}
                }
            ]
        })
    }

    #[test]
    fn order_is_flattened_with_buyer_and_lines() {
        let order: EbayOrder = serde_json::from_value(order_json()).unwrap();
        let (id, rec) = order_record(&order).unwrap();
        assert_eq!(id.as_str(), "12-34567-89012");
        assert_eq!(rec.str("buyer.email"), Some("ann@example.com"));
        assert_eq!(rec.str("buyer.city"), Some("Paris"));
        assert_eq!(rec.str("buyer.alias"), Some("ann_buys"));
        assert_eq!(rec.str("FulfillmentChannel"), Some("MFN"));
        assert_eq!(rec.str("currency"), Some("EUR"));
        assert_eq!(rec.str("latest_ship_date"), Some("2024-03-03T00:00:00.000Z"));

        let lines = rec.children("lines");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].f64("price_unit"), Some(10.0));
        assert_eq!(lines[0].f64("ship_price"), Some(5.0));
        assert_eq!(lines[1].f64("ship_price"), Some(0.0));
    }

    #[test]
    fn order_without_any_email_is_rejected() {
        let mut raw = order_json();
        raw["buyer"]["buyerRegistrationAddress"]["email"] = Value::Null;
        let order: EbayOrder = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            order_record(&order),
            Err(Error::MissingField { .. })
        ));
    }

    #[test]
    fn category_tree_flattens_parents_first() {
        let tree: CategoryTree = serde_json::from_value(json!({
            "categoryTreeId": "0",
            "rootCategoryNode": {
                "category": {"categoryId": "0", "categoryName": "Root"},
                "categoryTreeNodeLevel": 0,
                "childCategoryTreeNodes": [{
                    "category": {"categoryId": "20081", "categoryName": "Antiques"},
                    "categoryTreeNodeLevel": 1,
                    "childCategoryTreeNodes": [{
                        "category": {"categoryId": "37903", "categoryName": "Antiquities"},
                        "categoryTreeNodeLevel": 2,
                        "leafCategoryTreeNode": true
                    }]
                }]
            }
        }))
        .unwrap();
        let flat = flatten_categories(&tree).unwrap();
        let ids: Vec<&str> = flat.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["0", "20081", "37903"]);
        assert_eq!(flat[2].1.str("parent_category_id"), Some("20081"));
        assert_eq!(flat[2].1.bool("is_leaf_category"), Some(true));
        assert!(flat[0].1.get("parent_category_id").unwrap().is_null());
    }

    #[test]
    fn subtree_parent_comes_from_href() {
        let subtree: CategorySubtree = serde_json::from_value(json!({
            "categoryTreeId": "0",
            "categorySubtreeNode": {
                "category": {"categoryId": "37903", "categoryName": "Antiquities"},
                "categoryTreeNodeLevel": 2,
                "parentCategoryTreeNodeHref":
                    "https://api.ebay.com/commerce/taxonomy/v1/category_tree/0/get_category_subtree?category_id=20081"
            }
        }))
        .unwrap();
        let rec = subtree_root(&subtree).unwrap();
        assert_eq!(rec.str("parent_category_id"), Some("20081"));
    }

    #[test]
    fn inventory_body_rounds_quantity() {
        let data: FieldValues = json!({"Title": "Mug", "Quantity": 3.0})
            .as_object()
            .cloned()
            .unwrap();
        let body = serde_json::to_value(inventory_body("MUG-1", &data)).unwrap();
        assert_eq!(body["product"]["title"], json!("Mug"));
        assert_eq!(
            body["availability"]["shipToLocationAvailability"]["quantity"],
            json!(3)
        );
    }
}
