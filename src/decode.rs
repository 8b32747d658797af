//! Classification of buffered responses.

use crate::completion::{Completion, ModelList};
use crate::error::{Error, Result, extract_error_message, status_message};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Decode a buffered JSON response.
///
/// An error envelope always wins, even on a 2xx status: some gateways report upstream
/// failures with `200 OK`. A non-2xx status without an envelope is reported with the
/// raw body. Only then is the body decoded as `T`.
pub fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T> {
    if let Some(message) = extract_error_message(body) {
        return Err(Error::Server {
            status: status.as_u16(),
            message,
        });
    }

    if !status.is_success() {
        return Err(Error::Server {
            status: status.as_u16(),
            message: status_message(status, body),
        });
    }

    serde_json::from_slice(body).map_err(Error::Decoding)
}

pub fn decode_completion(status: StatusCode, body: &[u8]) -> Result<Completion> {
    decode_response(status, body)
}

pub fn decode_models(status: StatusCode, body: &[u8]) -> Result<ModelList> {
    decode_response(status, body)
}
