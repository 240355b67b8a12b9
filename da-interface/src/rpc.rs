//! Mapping between [`DaError`] and JSON-RPC error objects.
//!
//! Every variant travels with its own error code and the full error as `data`, so a client
//! rebuilds the exact variant the server raised without looking at the message.

use jsonrpsee::types::ErrorObjectOwned;

use crate::DaError;

/// [`DaError::MessageTooLarge`]
pub const MESSAGE_TOO_LARGE_CODE: i32 = -32010;
/// [`DaError::FallbackRequested`]
pub const FALLBACK_REQUESTED_CODE: i32 = -32011;
/// [`DaError::NotFound`]
pub const NOT_FOUND_CODE: i32 = -32012;
/// [`DaError::TimeoutExceeded`]
pub const TIMEOUT_EXCEEDED_CODE: i32 = -32013;
/// [`DaError::QuorumNotReached`]
pub const QUORUM_NOT_REACHED_CODE: i32 = -32014;
/// [`DaError::VerificationFailed`]
pub const VERIFICATION_FAILED_CODE: i32 = -32015;
/// [`DaError::MalformedCertificate`]
pub const MALFORMED_CERTIFICATE_CODE: i32 = -32016;
/// [`DaError::MalformedPayload`]
pub const MALFORMED_PAYLOAD_CODE: i32 = -32017;
/// [`DaError::Reorged`]
pub const REORGED_CODE: i32 = -32018;
/// [`DaError::Cancelled`]
pub const CANCELLED_CODE: i32 = -32019;
/// [`DaError::Transport`]
pub const TRANSPORT_CODE: i32 = -32020;
/// [`DaError::Internal`]
pub const INTERNAL_CODE: i32 = -32021;

/// The JSON-RPC error code of a [`DaError`] variant.
pub fn error_code(err: &DaError) -> i32 {
    match err {
        DaError::MessageTooLarge { .. } => MESSAGE_TOO_LARGE_CODE,
        DaError::FallbackRequested(_) => FALLBACK_REQUESTED_CODE,
        DaError::NotFound(_) => NOT_FOUND_CODE,
        DaError::TimeoutExceeded(_) => TIMEOUT_EXCEEDED_CODE,
        DaError::QuorumNotReached { .. } => QUORUM_NOT_REACHED_CODE,
        DaError::VerificationFailed(_) => VERIFICATION_FAILED_CODE,
        DaError::MalformedCertificate(_) => MALFORMED_CERTIFICATE_CODE,
        DaError::MalformedPayload(_) => MALFORMED_PAYLOAD_CODE,
        DaError::Reorged { .. } => REORGED_CODE,
        DaError::Cancelled => CANCELLED_CODE,
        DaError::Transport(_) => TRANSPORT_CODE,
        DaError::Internal(_) => INTERNAL_CODE,
    }
}

/// Converts a [`DaError`] into the error object returned by an RPC method.
pub fn to_jsonrpsee_error_object(err: DaError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(error_code(&err), err.to_string(), Some(err))
}

/// Rebuilds a [`DaError`] from an error object received by a client.
pub fn from_error_object(obj: &ErrorObjectOwned) -> DaError {
    let code = obj.code();
    if let Some(decoded) = obj
        .data()
        .and_then(|raw| serde_json::from_str::<DaError>(raw.get()).ok())
        .filter(|decoded| error_code(decoded) == code)
    {
        return decoded;
    }
    let message = obj.message().to_string();
    match code {
        MESSAGE_TOO_LARGE_CODE => DaError::MessageTooLarge { size: 0, max: None },
        FALLBACK_REQUESTED_CODE => DaError::FallbackRequested(message),
        NOT_FOUND_CODE => DaError::NotFound(message),
        TIMEOUT_EXCEEDED_CODE => DaError::TimeoutExceeded(message),
        VERIFICATION_FAILED_CODE => DaError::VerificationFailed(message),
        MALFORMED_CERTIFICATE_CODE => DaError::MalformedCertificate(message),
        MALFORMED_PAYLOAD_CODE => DaError::MalformedPayload(message),
        CANCELLED_CODE => DaError::Cancelled,
        _ => DaError::Transport(format!("rpc error {code}: {message}")),
    }
}

/// Converts a client side failure into a [`DaError`].
pub fn from_client_error(err: jsonrpsee::core::Error) -> DaError {
    match err {
        jsonrpsee::core::Error::Call(obj) => from_error_object(&obj),
        jsonrpsee::core::Error::RequestTimeout => {
            DaError::TimeoutExceeded("rpc request timed out".to_string())
        }
        other => DaError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_survive_the_error_object() {
        let errors = vec![
            DaError::MessageTooLarge {
                size: 100,
                max: Some(64),
            },
            DaError::FallbackRequested("backends unavailable".to_string()),
            DaError::QuorumNotReached {
                required: 2,
                collected: 1,
                backends: 3,
            },
            DaError::reorged(&[4u8; 32]),
            DaError::Cancelled,
        ];
        for err in errors {
            let obj = to_jsonrpsee_error_object(err.clone());
            assert_eq!(from_error_object(&obj), err);
        }
    }

    #[test]
    fn foreign_codes_become_transport_errors() {
        let obj = ErrorObjectOwned::owned(-32601, "method not found", None::<()>);
        assert!(matches!(from_error_object(&obj), DaError::Transport(_)));
    }

    #[test]
    fn code_without_data_still_maps_by_type() {
        let obj = ErrorObjectOwned::owned(FALLBACK_REQUESTED_CODE, "any text", None::<()>);
        assert!(matches!(
            from_error_object(&obj),
            DaError::FallbackRequested(_)
        ));
    }
}
