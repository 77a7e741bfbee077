//! Hosted pay page redirect URLs.

use super::paths::validate_identifier;
use crate::Result;

/// Login scope attached to a redirect when the hosted page may authenticate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginScope<'a> {
    pub merchant_key: &'a str,
    pub session_id: &'a str,
}

/// Build the checkout redirect for a transaction.
///
/// Format: `{pay_host}/{transaction_id}?embedding=true&sdk=true&method={method}`
/// followed by `&loginScope={merchant_key}&sessionId={session_id}` when a
/// login scope is given.
///
/// # Example
///
/// ```
/// use mona_lib::protocol::{checkout_url, LoginScope};
///
/// let url = checkout_url(
///     "https://pay.mona.no",
///     "T1",
///     "card",
///     Some(LoginScope { merchant_key: "mk", session_id: "s1" }),
/// )
/// .unwrap();
/// assert_eq!(
///     url,
///     "https://pay.mona.no/T1?embedding=true&sdk=true&method=card&loginScope=mk&sessionId=s1"
/// );
/// ```
pub fn checkout_url(
    pay_host: &str,
    transaction_id: &str,
    method: &str,
    login: Option<LoginScope<'_>>,
) -> Result<String> {
    validate_identifier(transaction_id)?;
    let mut url = format!(
        "{}/{}?embedding=true&sdk=true&method={}",
        pay_host.trim_end_matches('/'),
        transaction_id,
        urlencoding::encode(method)
    );
    if let Some(scope) = login {
        push_login_scope(&mut url, &scope);
    }
    Ok(url)
}

/// Build a mandatory-login redirect that continues to `target` afterwards.
///
/// Format: `{pay_host}/login?embedding=true&sdk=true&loginScope=..&sessionId=..&redirect={urlencoded target}`
pub fn login_url(pay_host: &str, scope: LoginScope<'_>, target: &str) -> String {
    let mut url = format!(
        "{}/login?embedding=true&sdk=true",
        pay_host.trim_end_matches('/')
    );
    push_login_scope(&mut url, &scope);
    url.push_str("&redirect=");
    url.push_str(&urlencoding::encode(target));
    url
}

fn push_login_scope(url: &mut String, scope: &LoginScope<'_>) {
    url.push_str("&loginScope=");
    url.push_str(&urlencoding::encode(scope.merchant_key));
    url.push_str("&sessionId=");
    url.push_str(&urlencoding::encode(scope.session_id));
}
