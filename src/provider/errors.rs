//! Pure AWS error classifier: the only place that
//! inspects vendor error codes. Maps `aws_sdk_ec2`/`aws_sdk_s3` SDK errors
//! into the closed `ErrorCode` taxonomy.

use std::fmt::Debug;

use aws_sdk_ec2::error::ProvideErrorMetadata as Ec2ErrorMetadata;
use aws_sdk_ec2::error::SdkError as Ec2SdkError;
use aws_sdk_s3::error::ProvideErrorMetadata as S3ErrorMetadata;
use aws_sdk_s3::error::SdkError as S3SdkError;
use aws_smithy_runtime_api::http::Response as HttpResponse;

use crate::error::{DriftError, ErrorCode};

/// Lowercase substrings, not exact codes — vendor auth codes vary across
/// services (`UnauthorizedOperation` on EC2, `AccessDenied` on S3, IAM
/// denials surfaced as `*AccessDeniedException`) and an exact list drifts
/// out of date with every new service.
const AUTH_CODE_SUBSTRINGS: &[&str] = &[
    "unauthorized",
    "authfailure",
    "accessdenied",
    "invalidclienttokenid",
    "notauthorized",
];

const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "NoSuchBucket",
    "NoSuchKey",
    "NoSuchTagSet",
    "NoSuchLifecycleConfiguration",
    "NoSuchCORSConfiguration",
    "NoSuchWebsiteConfiguration",
    "NoSuchBucketPolicy",
    "ServerSideEncryptionConfigurationNotFoundError",
    "ReplicationConfigurationNotFoundError",
];

/// Classify a raw EC2 SDK error into a `DriftError`. `operation` names the
/// call for the message (e.g. `"DescribeInstances"`).
pub fn classify_ec2<E>(service: &str, operation: &str, err: Ec2SdkError<E, HttpResponse>) -> DriftError
where
    E: Ec2ErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.as_service_error().and_then(|e| e.code()).map(String::from);
    classify(service, operation, code.as_deref(), status, err.into_service_error())
}

/// Classify a raw S3 SDK error into a `DriftError`.
pub fn classify_s3<E>(service: &str, operation: &str, err: S3SdkError<E, HttpResponse>) -> DriftError
where
    E: S3ErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.as_service_error().and_then(|e| e.code()).map(String::from);
    classify(service, operation, code.as_deref(), status, err.into_service_error())
}

fn classify(
    service: &str,
    operation: &str,
    code: Option<&str>,
    http_status: Option<u16>,
    err: impl std::error::Error + Send + Sync + 'static,
) -> DriftError {
    let message = format!("{service}::{operation} failed");
    let code_lower = code.unwrap_or("").to_ascii_lowercase();

    if AUTH_CODE_SUBSTRINGS.iter().any(|c| code_lower.contains(c)) {
        return DriftError::wrap(ErrorCode::PlatformAuthError, message, err);
    }
    let is_not_found_code = NOT_FOUND_CODES.iter().any(|c| code_lower == c.to_ascii_lowercase());
    if is_not_found_code || http_status == Some(404) {
        return DriftError::wrap(ErrorCode::ResourceNotFound, message, err);
    }
    DriftError::wrap(ErrorCode::PlatformApiError, message, err)
}

/// Classify a missing/`None` error at an entrypoint that should always be
/// called with an error present — a caller misuse, not an API failure.
pub fn missing_error(context: impl Debug) -> DriftError {
    DriftError::new(ErrorCode::Internal, format!("error classifier invoked without an error: {context:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_code_substrings_match_vendor_variants() {
        assert!(AUTH_CODE_SUBSTRINGS.iter().any(|c| "unauthorizedoperation".contains(c)));
        assert!(AUTH_CODE_SUBSTRINGS.iter().any(|c| "useraccessdeniedexception".contains(c)));
    }

    #[test]
    fn not_found_codes_classify_as_resource_not_found() {
        assert!(NOT_FOUND_CODES.contains(&"NoSuchBucket"));
        assert!(NOT_FOUND_CODES.contains(&"NoSuchBucketPolicy"));
    }

    #[test]
    fn http_404_falls_back_to_resource_not_found() {
        let classified = classify("s3", "GetObject", Some("SomeUnlistedCode"), Some(404), std::io::Error::other("x"));
        assert_eq!(classified.code, ErrorCode::ResourceNotFound);
    }

    #[test]
    fn unlisted_code_without_404_is_generic_api_error() {
        let classified = classify("s3", "GetObject", Some("SomeUnlistedCode"), Some(500), std::io::Error::other("x"));
        assert_eq!(classified.code, ErrorCode::PlatformApiError);
    }
}
