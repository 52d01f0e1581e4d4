//! CSRF token checks.
//!
//! The token is the session's own ticket value. It needs no storage of its
//! own and dies with the session entry at the daily flush.

use subtle::ConstantTimeEq;

use crate::error::GateError;

/// Form/query field carrying the token.
pub const CSRF_PARAM: &str = "csrf_token";

/// Check a submitted token against the session token.
///
/// Fails with 400 when either side is missing or the values differ.
pub fn verify(session: Option<&str>, submitted: Option<&str>) -> Result<(), GateError> {
    let session = session.ok_or_else(|| GateError::bad_request("Missing session for CSRF check"))?;
    let submitted = submitted.ok_or_else(|| GateError::bad_request("Missing CSRF token"))?;

    if bool::from(session.as_bytes().ct_eq(submitted.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!("CSRF token mismatch");
        Err(GateError::bad_request("Invalid CSRF token"))
    }
}

/// Hidden form field carrying `token`, for embedding in generated forms.
pub fn hidden_field(token: &str) -> String {
    format!(
        r#"<input type="hidden" name="{}" value="{}">"#,
        CSRF_PARAM,
        crate::routing::template::escape_html(token)
    )
}
