pub mod handler;
pub mod stdio;
