use std::collections::BTreeSet;

use crate::domain::{OrderRecord, OrderStatus, Shipping};

fn tags(list: &[&str]) -> Option<BTreeSet<String>> {
    if list.is_empty() {
        return None;
    }
    Some(list.iter().map(|t| t.to_string()).collect())
}

/// Sanitized, deterministic order set for demos and tests.
///
/// Contains the edge cases the business questions are about: a refunded high-value order
/// (ORD-0003), coupon and vip/promo tag usage, gift orders, and a cancelled bulk order.
pub fn demo_orders() -> Vec<OrderRecord> {
    let cities = [
        ("US", "New York"),
        ("DE", "Berlin"),
        ("FR", "Paris"),
        ("PT", "Lisbon"),
        ("GB", "London"),
    ];
    let statuses = [
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Pending,
        OrderStatus::Paid,
    ];

    let mut out = Vec::new();
    for i in 1..=12u32 {
        let (cc, city) = cities[(i as usize - 1) % cities.len()];
        let status = statuses[(i as usize - 1) % statuses.len()];
        let (tag_list, coupon): (&[&str], Option<&str>) = match i % 4 {
            0 => (&["vip"], Some("VIP20")),
            1 => (&["new", "promo"], Some("WELCOME10")),
            2 => (&[], None),
            _ => (&["promo"], None),
        };

        out.push(OrderRecord {
            order_id: format!("ORD-{i:04}"),
            status,
            quantity: 1 + (i as i64 % 3),
            unit_price: 10.0 + i as f64 * 2.5,
            tags: tags(tag_list),
            coupon_code: coupon.map(|c| c.to_string()),
            customer_email: format!("user{i:02}@masked.invalid"),
            created_at: format!("2025-01-{:02}T09:15:00Z", i),
            is_gift: i % 5 == 0,
            priority: Some((1 + i % 5) as u8),
            shipping: Some(Shipping {
                country_code: cc.to_string(),
                city: city.to_string(),
                postal_code: None,
            }),
        });
    }

    // Edge cases.
    if let Some(o) = out.get_mut(2) {
        o.status = OrderStatus::Refunded;
        o.quantity = 40;
        o.unit_price = 899.0;
        o.coupon_code = Some("STAFF50".to_string());
        o.tags = tags(&["vip", "manual-review"]);
    }
    if let Some(o) = out.get_mut(7) {
        o.status = OrderStatus::Cancelled;
        o.quantity = 250;
        o.unit_price = 3.99;
    }
    out
}

/// `demo_orders` rendered as NDJSON (one record per line).
pub fn demo_orders_ndjson() -> String {
    let mut out = String::new();
    for o in demo_orders() {
        if let Ok(line) = serde_json::to_string(&o) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
