/// A structured failure from the range-map engine.
///
/// Every error carries a short message plus a `context` tag identifying the
/// operation that failed, since the spec calls for "a short message and
/// source file/line" and stable tags survive refactors better than
/// `file!()`/`line!()` would.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{context}: {message}")]
pub struct RangeMapError {
    pub context: &'static str,
    pub message: String,
}

impl RangeMapError {
    pub fn new(context: &'static str, message: impl Into<String>) -> Self {
        Self {
            context,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RangeMapError>;
