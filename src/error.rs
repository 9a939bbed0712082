use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicBool, Ordering};

static DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

/// Exposes internal error details in response bodies. Development only.
pub fn enable_diagnostics() {
    DIAGNOSTICS.store(true, Ordering::Relaxed);
}

fn diagnostics_enabled() -> bool {
    DIAGNOSTICS.load(Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Config,
    Database,
    Authorizor,
    Unexpected,
    Conflict,
    Validation,
    Forbidden,
    NotFound,
    Unauthenticated,
}

impl Kind {
    pub fn code(&self) -> i32 {
        match self {
            Self::Config => 1,
            Self::Database => 2,
            Self::Authorizor => 3,
            Self::Unexpected => 5,
            Self::Conflict => 100,
            Self::Validation => 101,
            Self::Forbidden => 102,
            Self::NotFound => 103,
            Self::Unauthenticated => 104,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Conflict => StatusCode::CONFLICT,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: Kind,
    pub message: String,
    pub detail: Option<String>,
}

impl Error {
    fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn is_internal(&self) -> bool {
        self.code() < 100
    }

    /// A state-machine, capacity or uniqueness violation.
    pub fn invalid_invocation_error(message: impl Into<String>) -> Self {
        Self::new(Kind::Conflict, message)
    }

    pub fn invalid_input_error(message: impl Into<String>) -> Self {
        Self::new(Kind::Validation, message)
    }

    pub fn unauthorized_error(message: impl Into<String>) -> Self {
        Self::new(Kind::Forbidden, message)
    }

    pub fn not_found_error(message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, message)
    }

    pub fn unauthenticated_error(message: impl Into<String>) -> Self {
        Self::new(Kind::Unauthenticated, message)
    }

    pub fn config_error(detail: impl Display) -> Self {
        Self::new(Kind::Config, "configuration error").with_detail(detail)
    }

    pub fn database_error<T: Debug>(err: T) -> Self {
        Self::new(Kind::Database, "database error").with_detail(format!("{:?}", err))
    }

    pub fn unexpected_error(detail: impl Display) -> Self {
        Self::new(Kind::Unexpected, "unexpected error").with_detail(detail)
    }

    pub fn is_conflict_error(&self) -> bool {
        self.kind == Kind::Conflict
    }

    pub fn is_not_found_error(&self) -> bool {
        self.kind == Kind::NotFound
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        Self::config_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::database_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        Self::new(Kind::Authorizor, "authorization error").with_detail(err)
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_input_error(format!("invalid request body: {}", rejection))
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::invalid_input_error(format!("invalid path parameter: {}", rejection))
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_input_error(format!("invalid query string: {}", rejection))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = if self.is_internal() {
            tracing::error!(code = self.code(), detail = ?self.detail, "internal error");
            "Internal Server Error".to_string()
        } else {
            self.message.clone()
        };

        let body = match (&self.detail, diagnostics_enabled()) {
            (Some(detail), true) => json!({
                "code": self.code(),
                "error": message,
                "detail": detail,
            }),
            _ => json!({
                "code": self.code(),
                "error": message,
            }),
        };

        (self.kind.status(), Json(body)).into_response()
    }
}

#[test]
fn kinds_map_to_stable_codes_and_statuses() {
    let conflict = Error::invalid_invocation_error("insufficient seats available");
    assert_eq!(conflict.code(), 100);
    assert_eq!(conflict.kind.status(), StatusCode::CONFLICT);
    assert!(!conflict.is_internal());

    let forbidden = Error::unauthorized_error("you cannot book your own trip");
    assert_eq!(forbidden.code(), 102);
    assert_eq!(forbidden.kind.status(), StatusCode::FORBIDDEN);

    let unauthenticated = Error::unauthenticated_error("missing bearer token");
    assert_eq!(unauthenticated.kind.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn internal_errors_hide_their_message() {
    let err = Error::database_error("connection reset");
    assert!(err.is_internal());
    assert_eq!(err.message, "database error");
    assert_eq!(err.detail.as_deref(), Some("\"connection reset\""));

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn missing_env_var_is_a_config_error() {
    let err: Error = env::VarError::NotPresent.into();
    assert_eq!(err.kind, Kind::Config);
    assert_eq!(err.code(), 1);
}
