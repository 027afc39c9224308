pub mod email;
pub mod prompt;
pub mod report;
