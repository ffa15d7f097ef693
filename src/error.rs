use thiserror::Error;

/// Failures the screening pipeline recovers from locally
#[derive(Debug, Error)]
pub enum ScreeningError {
    /// The ticker directory could not be retrieved
    #[error("ticker universe unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The provider kept throttling after every retry
    #[error("{symbol} still rate limited after {attempts} attempts")]
    RateLimited { symbol: String, attempts: u32 },

    /// Any other per-ticker fetch failure
    #[error("{symbol} unavailable: {reason}")]
    TransientFetch { symbol: String, reason: String },
}
