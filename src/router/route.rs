use std::borrow::Cow;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

pub static ROUTE_BLOB_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/v2/.*/blobs/sha256:([0-9a-f]{64})$").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route<'a> {
    ApiVersion,
    Blob { digest: &'a str },
    Upstream,
    Info,
    Unknown,
}

impl Route<'_> {
    pub fn action_name(&self) -> &'static str {
        match self {
            Route::ApiVersion => "get-api-version",
            Route::Blob { .. } => "get-blob",
            Route::Upstream => "upstream",
            Route::Info => "info",
            Route::Unknown => "unknown",
        }
    }
}

/// Percent-decodes a request path so that `sha256%3A<hex>` and
/// `sha256:<hex>` are routed alike.
pub fn decode_path(path: &str) -> Result<Cow<'_, str>, String> {
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| format!("request path is not valid UTF-8: '{path}'"))?;

    if decoded.chars().any(char::is_control) {
        return Err(format!("request path contains control characters: '{path}'"));
    }

    Ok(decoded)
}

pub fn parse(path: &str) -> Route<'_> {
    match path {
        "/v2/" => Route::ApiVersion,
        "/" => Route::Info,
        _ if path.starts_with("/v2/") => {
            match ROUTE_BLOB_REGEX
                .captures(path)
                .and_then(|captures| captures.get(1))
            {
                Some(digest) => Route::Blob {
                    digest: digest.as_str(),
                },
                None => Route::Upstream,
            }
        }
        _ => Route::Unknown,
    }
}

/// Location of `path` on the upstream registry, with repositories moved
/// under `repository_prefix`. Paths of five characters or fewer (`/v2/`)
/// are kept as they are.
pub fn upstream_location(upstream: &str, repository_prefix: &str, path: &str) -> String {
    if path.len() > 5 {
        let rest = path.strip_prefix("/v2").unwrap_or(path);
        format!("{upstream}/v2/{repository_prefix}{rest}")
    } else {
        format!("{upstream}{path}")
    }
}
