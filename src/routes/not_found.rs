use actix_web::HttpResponse;

use crate::errors::RemitError;

#[allow(clippy::unused_async)]
pub async fn not_found() -> Result<HttpResponse, RemitError> {
    Err(RemitError::NotFound)
}
