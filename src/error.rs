use thiserror::Error;

/// Type alias for Result with ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

/// Error types for the mail export pipeline
#[derive(Error, Debug)]
pub enum ExportError {
    /// A Google API returned a non-success response
    #[error("API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Storage provider failure (folder lookup, folder or file creation)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A folder or file name the storage provider cannot represent
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Mail provider failure (search, thread enumeration, raw retrieval)
    #[error("Mail error: {0}")]
    MailError(String),

    /// Message could not be parsed
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Remote image could not be embedded
    #[error("Image error: {0}")]
    ImageError(String),

    /// HTML to PDF conversion failed
    #[error("PDF conversion failed: {0}")]
    PdfError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExportError {
    /// Map a non-success HTTP status from a Google API into an error
    pub fn from_status(status: hyper::StatusCode, context: &str) -> Self {
        let status_code = status.as_u16();
        let message = format!(
            "{}: HTTP {} {}",
            context,
            status_code,
            status.canonical_reason().unwrap_or("Unknown")
        );

        match status_code {
            401 => ExportError::AuthError(message),
            403 => ExportError::Forbidden(message),
            404 => ExportError::NotFound(message),
            500..=599 => ExportError::ServerError {
                status: status_code,
                message,
            },
            _ => ExportError::ApiError(message),
        }
    }

    /// Convert a generated Gmail client error, tagging it with the call that failed
    pub fn from_google(error: google_gmail1::Error, context: &str) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                Self::from_status(response.status(), context)
            }
            google_gmail1::Error::BadRequest(ref err) => {
                ExportError::ApiError(format!("{}: bad request: {}", context, err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                ExportError::NetworkError(format!("{}: connection error: {}", context, err))
            }
            google_gmail1::Error::Io(err) => {
                ExportError::NetworkError(format!("{}: {}", context, err))
            }
            _ => ExportError::ApiError(format!("{}: {}", context, error)),
        }
    }

    /// Whether this failure happened while talking to a remote service
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ExportError::ApiError(_)
                | ExportError::AuthError(_)
                | ExportError::NetworkError(_)
                | ExportError::ServerError { .. }
                | ExportError::NotFound(_)
                | ExportError::Forbidden(_)
        )
    }
}

impl From<google_gmail1::Error> for ExportError {
    fn from(error: google_gmail1::Error) -> Self {
        Self::from_google(error, "Google API call failed")
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => ExportError::ImageError(format!("HTTP {}: {}", status, error)),
            None => ExportError::NetworkError(error.to_string()),
        }
    }
}
