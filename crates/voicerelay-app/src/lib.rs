pub mod logging;
pub mod transcribe;
