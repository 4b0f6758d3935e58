use thiserror::Error;

/// Error surface for push delivery. The retry policy only needs to know
/// whether an attempt is worth repeating, so everything collapses into
/// transient vs permanent vs missing-config.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transient push failure: {0}")]
    Transient(String),

    #[error("permanent push failure: {0}")]
    Permanent(String),

    #[error("missing configuration: {0}")]
    ConfigMissing(&'static str),
}

impl DispatchError {
    /// Permanent errors abort retries immediately.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, DispatchError::Transient(_))
    }

    pub fn from_ureq(err: ureq::Error) -> Self {
        match err {
            // Bad request / auth rejections won't get better on retry.
            ureq::Error::StatusCode(code) if matches!(code, 400 | 401 | 403) => {
                DispatchError::Permanent(format!("HTTP {code}"))
            }
            ureq::Error::StatusCode(code) => DispatchError::Transient(format!("HTTP {code}")),
            other => DispatchError::Transient(other.to_string()),
        }
    }
}
