use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::llm::CompletionProvider;
use crate::session::SessionStore;
use crate::transcription::Transcriber;

pub struct AppState {
    pub config: Config,
    pub llm: Box<dyn CompletionProvider>,
    pub transcriber: Box<dyn Transcriber>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let llm = crate::llm::create_provider(&config)?;
        let transcriber = crate::transcription::create_transcriber(&config)?;
        let sessions = SessionStore::from_config(&config);
        Ok(AppState {
            config,
            llm,
            transcriber,
            sessions,
        })
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        model = %config.model,
        api_version = %config.api_version,
        remember = config.remember,
        "Runtime initialized"
    );
    let state = Arc::new(AppState::from_config(config)?);
    crate::web::start_web_server(state).await
}
