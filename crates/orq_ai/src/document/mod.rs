use std::collections::BTreeMap;
use std::fmt::Write as _;

use orq_core::domain::OrderRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Text projection of one order, plus the field values needed to cite and re-display it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub record_id: String,
    pub text: String,
    pub text_sha256: String,
    pub metadata: BTreeMap<String, String>,
}

/// Render an order into its canonical search text.
///
/// The output is a pure function of the record: fixed line order, tags in lexical order,
/// prices with two decimals. Optional lines are omitted rather than printed as `N/A`.
/// The two `*_SEARCH_*` header lines put the identifier at the top of the text so lexical
/// and embedding matches both see it early.
pub fn build_document(record: &OrderRecord) -> Document {
    let mut text = String::new();
    let id = record.order_id.as_str();
    let email = record.customer_email.as_str();

    // Writing into a String cannot fail.
    let _ = writeln!(text, "ORDER_SEARCH_ID: {id}");
    let _ = writeln!(text, "CUSTOMER_SEARCH_EMAIL: {email}");
    let _ = writeln!(text, "Order Details:");
    let _ = writeln!(text, "Order ID: {id}");
    let _ = writeln!(text, "Customer: {email}");
    let _ = writeln!(text, "Status: {}", record.status);
    let _ = writeln!(
        text,
        "Quantity: {}, Unit Price: {:.2}",
        record.quantity, record.unit_price
    );
    if let Some(s) = &record.shipping {
        let _ = writeln!(text, "Shipping: {}, {}", s.city, s.country_code);
    }
    let tags = record.tag_list();
    if !tags.is_empty() {
        let _ = writeln!(text, "Tags: {}", tags.join(", "));
    }
    if let Some(c) = record.coupon() {
        let _ = writeln!(text, "Coupon: {c}");
    }
    if record.is_gift {
        let _ = writeln!(text, "Is Gift: true");
    }
    if let Some(p) = record.priority {
        let _ = writeln!(text, "Priority: {p}");
    }
    let _ = writeln!(text, "Created At: {}", record.created_at);

    let text_sha256 = hex::encode(Sha256::digest(text.as_bytes()));

    let mut metadata = BTreeMap::new();
    metadata.insert("order_id".to_string(), record.order_id.clone());
    metadata.insert("customer_email".to_string(), record.customer_email.clone());
    metadata.insert("status".to_string(), record.status.to_string());
    metadata.insert("quantity".to_string(), record.quantity.to_string());
    metadata.insert("unit_price".to_string(), format!("{:.2}", record.unit_price));
    metadata.insert("created_at".to_string(), record.created_at.clone());
    metadata.insert("type".to_string(), "order".to_string());
    if !tags.is_empty() {
        metadata.insert("tags".to_string(), tags.join(","));
    }
    if let Some(c) = record.coupon() {
        metadata.insert("coupon_code".to_string(), c.to_string());
    }

    Document {
        record_id: record.order_id.clone(),
        text,
        text_sha256,
        metadata,
    }
}

pub fn build_documents(records: &[OrderRecord]) -> Vec<Document> {
    records.iter().map(build_document).collect()
}

#[cfg(test)]
mod tests {
    use orq_core::demo::demo_orders;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn renders_fixed_template() {
        let orders = demo_orders();
        let doc = build_document(&orders[2]);
        assert_eq!(
            doc.text,
            "ORDER_SEARCH_ID: ORD-0003\n\
             CUSTOMER_SEARCH_EMAIL: user03@masked.invalid\n\
             Order Details:\n\
             Order ID: ORD-0003\n\
             Customer: user03@masked.invalid\n\
             Status: refunded\n\
             Quantity: 40, Unit Price: 899.00\n\
             Shipping: Paris, FR\n\
             Tags: manual-review, vip\n\
             Coupon: STAFF50\n\
             Priority: 4\n\
             Created At: 2025-01-03T09:15:00Z\n"
        );
        assert_eq!(doc.record_id, "ORD-0003");
        assert_eq!(doc.metadata.get("status").map(String::as_str), Some("refunded"));
        assert_eq!(doc.metadata.get("coupon_code").map(String::as_str), Some("STAFF50"));
    }

    #[test]
    fn build_is_byte_identical_across_calls() {
        for o in demo_orders() {
            let a = build_document(&o);
            let b = build_document(&o.clone());
            assert_eq!(a, b);
            assert_eq!(a.text_sha256.len(), 64);
        }
    }

    #[test]
    fn blank_coupon_is_omitted() {
        let mut o = demo_orders().remove(0);
        o.coupon_code = Some("   ".to_string());
        let doc = build_document(&o);
        assert!(!doc.text.contains("Coupon:"));
        assert!(!doc.metadata.contains_key("coupon_code"));
    }
}
