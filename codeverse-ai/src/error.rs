use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI API key is not configured")]
    MissingApiKey,

    #[error("Message is empty")]
    EmptyPrompt,

    #[error("Completion API returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Completion API returned no choices")]
    EmptyResponse,

    #[error("Completion request failed: {0}")]
    Http(#[from] reqwest::Error),
}
