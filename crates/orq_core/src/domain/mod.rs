use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order as emitted by the validation collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipping {
    pub country_code: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// One validated, privacy-masked order.
///
/// Notes:
/// - Records arrive already validated and masked; nothing here re-checks business rules.
/// - `order_id` is unique across the corpus (`ORD-` followed by four digits).
/// - `created_at` is a canonical RFC3339 UTC string once it has passed through ingest.
/// - `tags` is a set; ordering is lexical so rendered text is stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub status: OrderStatus,
    pub quantity: i64,
    pub unit_price: f64,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub customer_email: String,
    pub created_at: String,

    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub shipping: Option<Shipping>,
}

impl OrderRecord {
    pub fn total_amount(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    pub fn coupon(&self) -> Option<&str> {
        self.coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_ref()
            .map(|t| t.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
