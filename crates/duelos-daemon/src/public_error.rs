// Copyright (c) 2026 Joseph Verdicchio and EvidenceOS Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use duelos_core::{DuelError, StorageError};
use serde::Serialize;

pub const PUBLIC_ERROR_HEADER: &str = "x-duelos-public-error-code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicErrorCode {
    InvalidInput,
    Forbidden,
    NotFound,
    Conflict,
    FailedPrecondition,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl PublicErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Unavailable => "UNAVAILABLE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict | Self::FailedPrecondition => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn classify(err: &DuelError) -> Self {
        match err {
            DuelError::NotFound(_) => Self::NotFound,
            DuelError::NotPartOfDuel { .. } | DuelError::NotChallengee { .. } => Self::Forbidden,
            DuelError::DuplicateSubmission { .. }
            | DuelError::AlreadyCompleted(_)
            | DuelError::PredicateFailed(_) => Self::Conflict,
            DuelError::InvalidTransition { .. } => Self::FailedPrecondition,
            DuelError::InvalidArgument(_) => Self::InvalidInput,
            DuelError::Storage(StorageError::Timeout(_)) => Self::DeadlineExceeded,
            DuelError::Storage(StorageError::Unavailable(_)) => Self::Unavailable,
            DuelError::Storage(_) => Self::Internal,
        }
    }
}

/// Error body returned to HTTP clients. Storage failures carry a fixed
/// message so adapter detail never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicError {
    pub code: PublicErrorCode,
    pub message: String,
}

impl PublicError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: PublicErrorCode::InvalidInput,
            message: message.into(),
        }
    }
}

impl From<&DuelError> for PublicError {
    fn from(err: &DuelError) -> Self {
        let code = PublicErrorCode::classify(err);
        let message = match err {
            DuelError::Storage(_) => match code {
                PublicErrorCode::DeadlineExceeded => "deadline exceeded".to_string(),
                PublicErrorCode::Unavailable => "service unavailable".to_string(),
                _ => "internal error".to_string(),
            },
            other => other.to_string(),
        };
        Self { code, message }
    }
}

impl From<DuelError> for PublicError {
    fn from(err: DuelError) -> Self {
        Self::from(&err)
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
}

impl IntoResponse for PublicError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code.as_str(),
                message: &self.message,
            },
        };
        let mut response = (self.code.status(), Json(body)).into_response();
        response.headers_mut().insert(
            PUBLIC_ERROR_HEADER,
            HeaderValue::from_static(self.code.as_str()),
        );
        response
    }
}
