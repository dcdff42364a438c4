use voice_domain::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// Request never produced a usable HTTP response. URLs are stripped since they carry the token.
    #[error("telegram request failed: {0}")]
    Http(reqwest::Error),

    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("telegram response for {method} carried no result")]
    MissingResult { method: &'static str },

    #[error("file {file_id} cannot be downloaded")]
    NotDownloadable { file_id: String },

    #[error("file download failed with status {status}")]
    Download { status: u16 },

    #[error("telegram client setup failed: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        TelegramError::Http(err.without_url())
    }
}

impl TelegramError {
    pub fn into_fetch_error(self) -> DomainError {
        DomainError::transport_fetch(self.to_string())
    }

    pub fn into_send_error(self) -> DomainError {
        DomainError::transport_send(self.to_string())
    }
}
