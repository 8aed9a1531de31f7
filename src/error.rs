//! Error types for the budgetpal daemon.

/// Top-level error type for the daily-report pipeline.
///
/// Every variant is caught at the job boundary in the scheduler: it marks
/// the current run as failed but never terminates the process.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Required credential or address missing at startup or at send time.
    #[error("config error: {0}")]
    Config(String),

    /// Aggregator (Plaid) call failed: network, auth, rate limit.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Malformed transaction data (unparseable date or amount).
    #[error("calculation error: {0}")]
    Calculation(String),

    /// Message delivery failed after the full variant fallback sequence.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DaemonError>;
