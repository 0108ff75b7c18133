use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::models::address::Address;

/// Delivery status. The happy path is strictly linear; `Canceled` is only
/// ever injected by the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    #[default]
    GoingToRestaurant,
    ArrivedAtRestaurant,
    PickedUp,
    Delivering,
    ArrivedAtCustomer,
    Delivered,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl OrderStatus {
    pub const DELIVERY_SEQUENCE: [OrderStatus; 6] = [
        OrderStatus::GoingToRestaurant,
        OrderStatus::ArrivedAtRestaurant,
        OrderStatus::PickedUp,
        OrderStatus::Delivering,
        OrderStatus::ArrivedAtCustomer,
        OrderStatus::Delivered,
    ];

    pub fn successor(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::GoingToRestaurant => Some(OrderStatus::ArrivedAtRestaurant),
            OrderStatus::ArrivedAtRestaurant => Some(OrderStatus::PickedUp),
            OrderStatus::PickedUp => Some(OrderStatus::Delivering),
            OrderStatus::Delivering => Some(OrderStatus::ArrivedAtCustomer),
            OrderStatus::ArrivedAtCustomer => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Canceled => None,
        }
    }

    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        self.successor() == Some(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Canceled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::GoingToRestaurant => "goingToRestaurant",
            OrderStatus::ArrivedAtRestaurant => "arrivedAtRestaurant",
            OrderStatus::PickedUp => "pickedUp",
            OrderStatus::Delivering => "delivering",
            OrderStatus::ArrivedAtCustomer => "arrivedAtCustomer",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, alias = "fullName")]
    pub name: String,
    #[serde(default, alias = "phoneNumber")]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

impl Restaurant {
    pub fn position(&self) -> Option<GeoPoint> {
        self.location
            .or_else(|| self.address.as_ref().and_then(|address| address.location))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topping {
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, alias = "price")]
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toppings: Vec<Topping>,
}

fn default_quantity() -> u32 {
    1
}

impl LineItem {
    pub fn line_total(&self) -> f64 {
        let toppings: f64 = self.toppings.iter().map(|topping| topping.price).sum();
        (self.unit_price + toppings) * self.quantity as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default, alias = "shippingFee")]
    pub delivery_fee: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default, alias = "totalAmount", alias = "totalPrice")]
    pub final_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(default, alias = "paymentMethod")]
    pub method: String,
    #[serde(default, alias = "paymentStatus")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "_id", alias = "orderId")]
    pub id: String,
    #[serde(rename = "orderStatus", alias = "status", default)]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant: Option<Restaurant>,
    #[serde(default, alias = "orderItems")]
    pub items: Vec<LineItem>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipper_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OrderStatus::GoingToRestaurant,
            customer: None,
            restaurant: None,
            items: Vec::new(),
            totals: OrderTotals::default(),
            payment: None,
            delivery_address: None,
            note: None,
            shipper_id: None,
            updated_at: None,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_shipper(mut self, shipper_id: impl Into<String>) -> Self {
        self.shipper_id = Some(shipper_id.into());
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.shipper_id
            .as_deref()
            .is_some_and(|shipper| !shipper.trim().is_empty())
    }

    pub fn items_subtotal(&self) -> f64 {
        self.items.iter().map(LineItem::line_total).sum()
    }
}
