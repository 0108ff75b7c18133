pub mod address;
pub mod envelope;
pub mod order;
pub mod session;
pub mod wallet;
