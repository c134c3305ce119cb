/// Errors raised while turning formula text into an executable plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("formula parse error: {message}")]
    Parse { message: String },
    #[error("formula is not monitorable: {reason}")]
    Unmonitorable { reason: String },
}

impl FormulaError {
    pub(crate) fn unmonitorable(reason: impl Into<String>) -> Self {
        FormulaError::Unmonitorable {
            reason: reason.into(),
        }
    }
}
