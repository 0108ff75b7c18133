pub mod controller;
pub mod offer;
pub mod session;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;
