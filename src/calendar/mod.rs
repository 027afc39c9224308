pub mod availability;
pub mod error;
pub mod model;

#[cfg(test)]
pub(crate) mod fixtures;
