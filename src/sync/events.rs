//! Socket event names shared with the backend.

pub const CURRENT_LOCATION: &str = "current_location";
pub const UPDATE_ONLINE_STATUS: &str = "update_online_status";
pub const ACCEPT_ORDER: &str = "accept_order";
pub const DECLINE_ORDER: &str = "decline_order";
pub const ORDER_STATUS_UPDATE: &str = "order_status_update";
pub const WALLET_DEPOSIT: &str = "wallet_deposit";
pub const WALLET_WITHDRAW: &str = "wallet_withdraw";
pub const GET_WALLET_BALANCE: &str = "getWalletBalance";

pub const NEW_ORDER_ASSIGNED: &str = "new_order_assigned";
pub const ONLINE_STATUS_RESPONSE: &str = "online_status_response";
pub const SHIPPER_STATUS_UPDATED: &str = "shipper_status_updated";
pub const ORDER_RESPONSE: &str = "order_response";
pub const STATUS_UPDATE_RESPONSE: &str = "status_update_response";
pub const WALLET_BALANCE: &str = "walletBalance";
pub const WALLET_DEPOSIT_RESPONSE: &str = "wallet_deposit_response";
pub const WALLET_WITHDRAW_RESPONSE: &str = "wallet_withdraw_response";
