//! Session cookie lookup and rewriting.
//!
//! Cookie names are matched case-insensitively everywhere in this module.
//! Header values are read byte-wise, so a non-ASCII value in one cookie does
//! not hide the others.

use std::borrow::Cow;

use cookie::Cookie;
use hyper::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};

/// Find `name` among the request's `Cookie` headers.
pub fn find_request_cookie(headers: &HeaderMap, name: &str) -> Option<Cookie<'static>> {
    headers
        .get_all(COOKIE)
        .iter()
        .map(lossy)
        .flat_map(|value| Cookie::split_parse(value).filter_map(Result::ok))
        .find(|cookie| cookie.name().eq_ignore_ascii_case(name))
        .map(Cookie::into_owned)
}

/// Find `name` among the response's `Set-Cookie` headers.
pub fn find_response_cookie(headers: &HeaderMap, name: &str) -> Option<Cookie<'static>> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .map(lossy)
        .filter_map(|value| Cookie::parse(value).ok())
        .find(|cookie| cookie.name().eq_ignore_ascii_case(name))
        .map(Cookie::into_owned)
}

/// Build the cookie the shadow backend should see: `original` with its value
/// replaced by `shadow_token`.
///
/// Path, domain, expiry, max-age, secure and http-only carry over; nothing
/// else does.
pub fn shadow_cookie(original: &Cookie<'_>, shadow_token: &str) -> Cookie<'static> {
    let mut cookie = Cookie::new(original.name().to_owned(), shadow_token.to_owned());
    if let Some(path) = original.path() {
        cookie.set_path(path.to_owned());
    }
    if let Some(domain) = original.domain() {
        cookie.set_domain(domain.to_owned());
    }
    if let Some(expires) = original.expires() {
        cookie.set_expires(expires);
    }
    cookie.set_max_age(original.max_age());
    cookie.set_secure(original.secure());
    cookie.set_http_only(original.http_only());
    cookie
}

/// Replace the request's `Cookie` headers with a single header in which the
/// pair named like `replacement` carries the replacement's value.
///
/// Other pairs are kept in order, byte for byte. Returns `false`, leaving the
/// headers untouched, if the result cannot be encoded as a header value.
pub fn replace_request_cookie(headers: &mut HeaderMap, replacement: &Cookie<'_>) -> bool {
    let session_pair = replacement.stripped().to_string();
    let mut pairs: Vec<&[u8]> = Vec::new();
    let mut replaced = false;

    for value in headers.get_all(COOKIE).iter() {
        for pair in value.as_bytes().split(|&b| b == b';') {
            let pair = pair.trim_ascii();
            if pair.is_empty() {
                continue;
            }
            if pair_name(pair).eq_ignore_ascii_case(replacement.name().as_bytes()) {
                if !replaced {
                    pairs.push(session_pair.as_bytes());
                    replaced = true;
                }
            } else {
                pairs.push(pair);
            }
        }
    }
    if !replaced {
        pairs.push(session_pair.as_bytes());
    }

    match HeaderValue::from_bytes(&pairs.join(&b"; "[..])) {
        Ok(value) => {
            headers.remove(COOKIE);
            headers.insert(COOKIE, value);
            true
        }
        Err(_) => false,
    }
}

fn lossy(value: &HeaderValue) -> Cow<'_, str> {
    String::from_utf8_lossy(value.as_bytes())
}

fn pair_name(pair: &[u8]) -> &[u8] {
    match pair.iter().position(|&b| b == b'=') {
        Some(eq) => pair[..eq].trim_ascii(),
        None => pair,
    }
}
