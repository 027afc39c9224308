pub mod generator;
pub mod tone;
