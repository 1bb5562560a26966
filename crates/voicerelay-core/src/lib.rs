pub mod error;
pub mod llm_types;
