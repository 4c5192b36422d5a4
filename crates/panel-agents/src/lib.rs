pub mod agents;
pub mod config;
pub mod llm;
pub mod prompts;
