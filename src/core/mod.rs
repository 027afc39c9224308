pub mod assistant;
pub mod template;
pub mod window;
