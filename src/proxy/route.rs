//! Backend route resolution
//!
//! Subpaths coming from handlers are joined onto the configured base URL with
//! `Url::join`, then checked so the result stays under the base: same scheme,
//! host and port, and a path inside the base path.

use reqwest::Url;

use super::error::ProxyError;

/// Resolve `subpath` against `base`, refusing anything that leaves the base.
///
/// A leading `/` is treated as relative to the base, so `/form` and `form`
/// resolve to the same target.
pub fn resolve_route(base: &Url, subpath: &str) -> Result<Url, ProxyError> {
    let route = subpath.trim();
    let invalid = |reason: &'static str| ProxyError::InvalidRoute {
        route: subpath.to_string(),
        reason,
        detail: None,
    };

    if route.chars().any(|c| c == '\\' || c.is_control()) {
        return Err(invalid("route contains backslashes or control characters"));
    }
    if route.starts_with("//") {
        return Err(invalid("scheme-relative routes are not allowed"));
    }
    if Url::parse(route).is_ok() {
        return Err(invalid("absolute URLs are not allowed"));
    }

    let relative = route.trim_start_matches('/');
    let target = base
        .join(relative)
        .map_err(|_| invalid("route cannot be joined onto the backend URL"))?;

    if !same_origin(base, &target) {
        return Err(invalid("route leaves the backend origin"));
    }
    if !target.path().starts_with(base.path()) {
        return Err(invalid("route escapes the backend base path"));
    }

    Ok(target)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.username() == b.username()
        && a.password() == b.password()
}
