pub mod config;
pub mod llm;
pub mod runtime;
pub mod session;
pub mod transcription;
pub mod upload;
pub mod web;

pub use voicerelay_app::logging;
pub use voicerelay_app::transcribe;
pub use voicerelay_core::error;
pub use voicerelay_core::llm_types;
