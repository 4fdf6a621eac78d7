// AI-written reports for completed results.
// All LLM calls go through llm_client.

pub mod generator;
pub mod handlers;
pub mod jobs;
pub mod prompts;
pub mod store;
