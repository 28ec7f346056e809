//! Error types shared by the autogan library crates.

use thiserror::Error;

/// Errors raised by metrics, the update-frequency controller, the step
/// executor and the loss-log tooling.
#[derive(Debug, Error)]
pub enum AutoGanError {
    /// Degenerate metric input: constant image, shape mismatch, or an image
    /// smaller than the similarity window.
    #[error("invalid metric input: {0}")]
    InvalidMetricInput(String),

    #[error("discriminator loss window is empty; record at least one step before recomputing")]
    EmptyWindow,

    #[error("discriminator loss window mean is not finite ({0})")]
    NonFiniteLoss(f64),

    /// A network was stepped while its parameters were frozen, or gradients
    /// reached a frozen network.
    #[error("gradient state violation: {0}")]
    GradientStateViolation(String),

    #[error("malformed loss log line {line}: {reason}")]
    MalformedLogLine { line: usize, reason: String },

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Result type for autogan library operations.
pub type Result<T> = std::result::Result<T, AutoGanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = AutoGanError::InvalidMetricInput("constant image".to_string());
        assert!(err.to_string().contains("constant image"));

        let err = AutoGanError::MalformedLogLine {
            line: 7,
            reason: "missing PSNR".to_string(),
        };
        assert!(err.to_string().contains("line 7"));
        assert!(err.to_string().contains("missing PSNR"));

        assert!(AutoGanError::EmptyWindow.to_string().contains("empty"));
    }

    #[test]
    fn candle_errors_convert() {
        fn fails() -> Result<()> {
            Err(candle_core::Error::Msg("boom".to_string()))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(AutoGanError::Candle(_))));
    }
}
