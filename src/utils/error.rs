use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown retailer: {retailer}")]
    UnknownRetailer { retailer: String },

    #[error("Retailer {retailer} has no extraction tiers configured")]
    MissingTierList { retailer: String },

    #[error("Tier '{tier}' configured for {retailer} has no registered backend")]
    UnknownTier { retailer: String, tier: String },

    #[error("Invalid stage transition: {from} -> {to}")]
    StageRegression { from: String, to: String },

    #[error("Corrupt stored value: {message}")]
    Data { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoutError {
    /// True for errors that must abort startup rather than be skipped over.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScoutError::Config(_)
                | ScoutError::UnknownRetailer { .. }
                | ScoutError::MissingTierList { .. }
                | ScoutError::UnknownTier { .. }
        )
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScoutError = io_err.into();
        assert!(matches!(err, ScoutError::Io(_)));
    }

    #[test]
    fn test_unknown_retailer_message() {
        let err = ScoutError::UnknownRetailer {
            retailer: "acme".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown retailer: acme");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_stage_regression_is_not_configuration() {
        let err = ScoutError::StageRegression {
            from: "scraped".to_string(),
            to: "discovered".to_string(),
        };
        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "Invalid stage transition: scraped -> discovered");
    }
}
