use serde::Serialize;
use utoipa::ToSchema;

/// Standard response envelope for the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize + ToSchema> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A struct with nothing, used where an envelope carries no data.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl<T: Serialize + ToSchema> Default for ApiResponse<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            message: None,
        }
    }
}

impl ApiResponse<Empty> {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(ApiErrorBody {
                code: code.into(),
                message: message.into(),
            }),
            ..Default::default()
        }
    }
}
