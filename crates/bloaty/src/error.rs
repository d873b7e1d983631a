use std::path::PathBuf;

/// The §7 error taxonomy, as a structured enum rather than a bag of
/// strings — each variant is one of the four buckets spec.md names, so
/// callers (and tests) can match on *kind* without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {message}")]
    Malformed {
        context: &'static str,
        message: String,
    },

    #[error("{context}: {message}")]
    Semantic {
        context: &'static str,
        message: String,
    },

    #[error("{context}: {message}")]
    Configuration {
        context: &'static str,
        message: String,
    },

    #[error("{context}: {message}")]
    Resource {
        context: &'static str,
        message: String,
    },

    #[error("{0}")]
    RangeMap(#[from] rangemap_core::RangeMapError),

    #[error("could not open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    pub fn malformed(context: &'static str, message: impl Into<String>) -> Self {
        Error::Malformed {
            context,
            message: message.into(),
        }
    }

    pub fn semantic(context: &'static str, message: impl Into<String>) -> Self {
        Error::Semantic {
            context,
            message: message.into(),
        }
    }

    pub fn configuration(context: &'static str, message: impl Into<String>) -> Self {
        Error::Configuration {
            context,
            message: message.into(),
        }
    }

    pub fn resource(context: &'static str, message: impl Into<String>) -> Self {
        Error::Resource {
            context,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
