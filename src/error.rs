use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{BattleStatus, IdParseError};

/// Errors raised by the battle engine. Each is scoped to one battle or account.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidSpec(String),
    #[error("Illegal transition from {from}: {reason}")]
    IllegalTransition { from: BattleStatus, reason: String },
    #[error("Battle {0} is not live")]
    BattleNotLive(String),
    #[error("Song {0} is not part of this battle")]
    UnknownSong(String),
    #[error("Team side {0:?} does not exist")]
    UnknownTeam(String),
    #[error("Insufficient funds on account {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: String,
        balance: i64,
        required: i64,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Settlement failed: {0}")]
    SettlementFailure(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl EngineError {
    pub fn illegal(from: BattleStatus, reason: impl Into<String>) -> Self {
        EngineError::IllegalTransition {
            from,
            reason: reason.into(),
        }
    }

    /// Lock contention and pool exhaustion; worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Db(sqlx::Error::PoolTimedOut) | EngineError::Db(sqlx::Error::Io(_)) => true,
            // SQLITE_BUSY, SQLITE_LOCKED and their extended variants.
            EngineError::Db(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some("5") | Some("6") | Some("261") | Some("262") | Some("517")
            ),
            _ => false,
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidSpec(_) => "invalid_spec",
            EngineError::IllegalTransition { .. } => "illegal_transition",
            EngineError::BattleNotLive(_) => "battle_not_live",
            EngineError::UnknownSong(_) => "unknown_song",
            EngineError::UnknownTeam(_) => "unknown_team",
            EngineError::InsufficientFunds { .. } => "insufficient_funds",
            EngineError::NotFound(_) => "not_found",
            EngineError::SettlementFailure(_) => "settlement_failure",
            EngineError::Db(_) => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("{1}")]
    Engine(&'static str, String, StatusCode),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<IdParseError> for AppError {
    fn from(err: IdParseError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
            EngineError::UnknownSong(_) | EngineError::UnknownTeam(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::IllegalTransition { .. } | EngineError::BattleNotLive(_) => {
                StatusCode::CONFLICT
            }
            EngineError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::SettlementFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::Engine(err.code(), err.to_string(), status)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Engine(code, msg, status) => (status, code, msg),
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    /// Database error carrying only a SQLite result code.
    #[derive(Debug)]
    struct CodedDbError(&'static str);

    impl std::fmt::Display for CodedDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "sqlite error {}", self.0)
        }
    }

    impl std::error::Error for CodedDbError {}

    impl sqlx::error::DatabaseError for CodedDbError {
        fn message(&self) -> &str {
            "sqlite error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.0 {
                "2067" => sqlx::error::ErrorKind::UniqueViolation,
                "787" => sqlx::error::ErrorKind::ForeignKeyViolation,
                "275" => sqlx::error::ErrorKind::CheckViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn db_error(code: &'static str) -> EngineError {
        EngineError::Db(sqlx::Error::Database(Box::new(CodedDbError(code))))
    }

    #[test]
    fn test_lock_contention_is_transient() {
        // SQLITE_BUSY, SQLITE_LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT
        for code in ["5", "6", "261", "262", "517"] {
            assert!(db_error(code).is_transient(), "code {}", code);
        }
        assert!(EngineError::Db(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn test_constraint_and_domain_errors_are_permanent() {
        // UNIQUE, FOREIGN KEY and CHECK violations
        for code in ["2067", "787", "275", "19"] {
            assert!(!db_error(code).is_transient(), "code {}", code);
        }
        assert!(!EngineError::Db(sqlx::Error::RowNotFound).is_transient());
        assert!(!EngineError::SettlementFailure("x".into()).is_transient());
        assert!(!EngineError::illegal(BattleStatus::Live, "x").is_transient());
    }

    #[test]
    fn test_engine_error_status_mapping() {
        let cases = [
            (EngineError::InvalidSpec("x".into()), StatusCode::BAD_REQUEST),
            (
                EngineError::illegal(BattleStatus::Completed, "already over"),
                StatusCode::CONFLICT,
            ),
            (EngineError::BattleNotLive("b".into()), StatusCode::CONFLICT),
            (
                EngineError::UnknownSong("s".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                EngineError::InsufficientFunds {
                    account: "a".into(),
                    balance: 0,
                    required: 10,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                EngineError::SettlementFailure("db".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
