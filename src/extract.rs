//! `Path` and `Json` whose rejections come back as [`AppError`] JSON bodies.

use axum::{extract::{FromRequest, FromRequestParts}, response::{IntoResponse, Response}};
use serde::Serialize;

use crate::AppError;

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}
