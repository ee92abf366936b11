use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

pub type ServiceResult<T> = Result<T, AppError>;
pub type ServiceResponse<T> = ServiceResult<Json<T>>;

#[track_caller]
pub fn unexpected<T, E: Into<anyhow::Error>>(e: E) -> ServiceResult<T> {
    let caller = std::panic::Location::caller();
    error!("An unexpected error has occurred at {caller}: {}", e.into());
    Err(AppError::Unexpected)
}

#[derive(Debug, PartialEq, Eq)]
pub enum AppError {
    Unexpected,
    DecodingRequestFailed,

    /// Payload shape/size violation, with a short human-readable reason.
    InvalidInput(&'static str),

    MessagesNotFound,
    MessagesAccessDenied,
    MessagesAlreadyDeleted,

    TeamsAccessDenied,

    UsersNotFound,
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    #[track_caller]
    fn from(e: E) -> Self {
        unexpected::<(), E>(e).unwrap_err()
    }
}

impl AppError {
    pub const fn code(&self) -> &'static str {
        match self {
            AppError::Unexpected => "unexpected",
            AppError::DecodingRequestFailed => "decoding_request_failed",

            AppError::InvalidInput(_) => "invalid_input",

            AppError::MessagesNotFound => "messages.not_found",
            AppError::MessagesAccessDenied => "messages.access_denied",
            AppError::MessagesAlreadyDeleted => "messages.already_deleted",

            AppError::TeamsAccessDenied => "teams.access_denied",

            AppError::UsersNotFound => "users.not_found",
        }
    }

    pub const fn message(&self) -> &'static str {
        match self {
            AppError::Unexpected => "An unexpected error has occurred.",
            AppError::DecodingRequestFailed => "Failed to decode request",

            AppError::InvalidInput(reason) => reason,

            AppError::MessagesNotFound => "Message could not be found.",
            AppError::MessagesAccessDenied => "access to task denied",
            AppError::MessagesAlreadyDeleted => "This message has already been deleted.",

            AppError::TeamsAccessDenied => "You are not a member of this team.",

            AppError::UsersNotFound => "This user does not exist.",
        }
    }

    pub const fn http_status_code(&self) -> StatusCode {
        match self {
            AppError::DecodingRequestFailed | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            AppError::MessagesAccessDenied | AppError::TeamsAccessDenied => {
                StatusCode::UNAUTHORIZED
            }

            AppError::MessagesAlreadyDeleted => StatusCode::CONFLICT,

            AppError::MessagesNotFound | AppError::UsersNotFound => StatusCode::NOT_FOUND,

            AppError::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn response_parts(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status = self.http_status_code();
        let response = ErrorResponse {
            code: self.code(),
            message: self.message(),
        };
        (status, Json(response))
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.response_parts().into_response()
    }
}
