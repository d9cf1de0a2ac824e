//! Error types for the admission gate and its middleware
use std::fmt;

/// Errors produced when constructing an [`AdmissionGate`](crate::AdmissionGate).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateConfigError {
    /// Capacity must be positive and finite.
    #[error("capacity must be > 0 and finite (got {0})")]
    InvalidCapacity(f64),
    /// Refill rate must be positive and finite.
    #[error("refill_rate_per_second must be > 0 and finite (got {0})")]
    InvalidRefillRate(f64),
}

/// Error returned by [`AdmissionService`](crate::rate_limit::AdmissionService).
#[derive(Debug, Clone)]
pub enum AdmissionError<E> {
    /// The gate had fewer tokens than the request costs; the inner service was not called.
    Rejected {
        /// Tokens the request asked for.
        cost: f64,
    },
    /// The protected operation ran and failed. Its tokens stay spent.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { cost } => {
                write!(f, "admission rejected: not enough tokens for cost {}", cost)
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AdmissionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

impl<E> AdmissionError<E> {
    /// Check if the gate turned the request away.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn rejected_display_mentions_cost() {
        let err: AdmissionError<io::Error> = AdmissionError::Rejected { cost: 1.0 };
        let msg = err.to_string();
        assert!(msg.contains("rejected"));
        assert!(msg.contains('1'));
        assert!(err.source().is_none());
    }

    #[test]
    fn inner_error_is_transparent() {
        let err = AdmissionError::Inner(io::Error::new(io::ErrorKind::Other, "upstream down"));
        assert_eq!(err.to_string(), "upstream down");
        assert!(err.is_inner());
        assert!(!err.is_rejected());
        assert!(err.source().is_some());
        assert_eq!(err.into_inner().map(|e| e.to_string()), Some("upstream down".to_string()));
    }

    #[test]
    fn predicates_cover_all_variants() {
        let rejected: AdmissionError<io::Error> = AdmissionError::Rejected { cost: 2.0 };
        assert!(rejected.is_rejected());
        assert!(rejected.as_inner().is_none());
        assert!(rejected.into_inner().is_none());
    }

    #[test]
    fn gate_config_error_display() {
        assert_eq!(
            GateConfigError::InvalidCapacity(0.0).to_string(),
            "capacity must be > 0 and finite (got 0)"
        );
        assert!(GateConfigError::InvalidRefillRate(-1.0).to_string().contains("-1"));
    }
}
