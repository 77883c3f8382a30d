use thiserror::Error;

use crate::domain::{FunJumperId, LoadId, PassengerId};
use crate::storage::is_constraint_violation;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fun-jumper {funjumper_id} is already manifested on load {load_id}")]
    DuplicateManifest {
        load_id: LoadId,
        funjumper_id: FunJumperId,
    },

    #[error("No pending tandem booking found for passenger {0}")]
    NoBookingFound(PassengerId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database error: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl AppError {
    /// Domain failures are the caller's to fix; persistence failures are not.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, AppError::Persistence(_))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if is_constraint_violation(&err) {
            AppError::ConstraintViolation(format!("{:#}", err))
        } else {
            AppError::Persistence(err)
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        anyhow::Error::new(err).into()
    }
}
