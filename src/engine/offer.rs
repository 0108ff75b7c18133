use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::models::order::Order;

/// An order offered to this courier, waiting for accept or decline.
/// Lives only in memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOffer {
    pub order: Order,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl PendingOffer {
    pub fn order_id(&self) -> &str {
        &self.order.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    Declined,
    Expired,
    Rejected,
    Superseded,
}

impl OfferOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferOutcome::Accepted => "accepted",
            OfferOutcome::Declined => "declined",
            OfferOutcome::Expired => "expired",
            OfferOutcome::Rejected => "rejected",
            OfferOutcome::Superseded => "superseded",
        }
    }
}

/// Hooks for whatever presents offers to the courier (alert sound, vibration,
/// navigation to the order screen). Calls happen on runtime tasks and must
/// not block.
pub trait OfferNotifier: Send + Sync + 'static {
    fn offer_presented(&self, _offer: &PendingOffer) {}

    fn offer_cleared(&self, _order_id: &str, _outcome: OfferOutcome) {}

    fn order_accepted(&self, _order: &Order) {}
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl OfferNotifier for LogNotifier {
    fn offer_presented(&self, offer: &PendingOffer) {
        info!(
            order_id = %offer.order.id,
            expires_at = %offer.expires_at,
            distance_km = offer.distance_km,
            "new order offer"
        );
    }

    fn offer_cleared(&self, order_id: &str, outcome: OfferOutcome) {
        info!(order_id, outcome = outcome.as_str(), "offer cleared");
    }

    fn order_accepted(&self, order: &Order) {
        info!(order_id = %order.id, "order accepted; navigate to current order");
    }
}
