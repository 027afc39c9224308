pub mod agent;
pub mod llm;
pub mod orchestrator;
pub mod rules;
