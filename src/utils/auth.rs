//! Session cookie handling for backend requests.

use crate::core::backend::SessionContext;

/// Attach the session cookie that identifies the signed-in user.
///
/// The backend reads the user from a `user_id` cookie; the value is sent
/// explicitly on each request rather than kept in a shared cookie jar.
pub fn add_session_cookie(
    request: reqwest::RequestBuilder,
    context: &SessionContext,
) -> reqwest::RequestBuilder {
    request.header(reqwest::header::COOKIE, context.cookie_header())
}
