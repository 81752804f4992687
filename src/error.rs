use std::io;
use thiserror::Error;

/// Process-level failures. Price streaming itself has no error cases.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Server(#[from] io::Error),

    #[error("frame serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_message() {
        let err = ServiceError::Bind {
            addr: "127.0.0.1:8080".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:8080: address in use");
    }

    #[test]
    fn test_serialization_error_converts() {
        let source = serde_json::from_str::<u64>("not json").unwrap_err();
        let err = ServiceError::from(source);
        assert!(matches!(err, ServiceError::Serialization(_)));
        assert!(err.to_string().starts_with("frame serialization error:"));
    }
}
