//! Response shaping for a single fetched object.

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use futures::{StreamExt, TryStreamExt};
use tracing::{error, warn};
use weasel_store::{ByteStream, Object};

/// Supported methods, formatted for `allow` and CORS allow-methods.
pub const ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";

/// Headers exposed to cross-origin callers.
pub const EXPOSE_HEADERS: &str = "Location, Etag, Content-Disposition";

const ACCESS_CONTROL_REQUEST_HEADERS: &str = "access-control-request-headers";

/// Reports whether `m` is one of the supported methods.
pub fn valid_method(m: &Method) -> bool {
    m == Method::GET || m == Method::HEAD || m == Method::OPTIONS
}

/// Origins allowed to read objects cross-origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Wildcard: every origin, answered with `*`.
    Any,
    /// Exact matches only. Kept sorted.
    List(Vec<String>),
}

/// CORS policy applied to every object response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsPolicy {
    origins: AllowedOrigins,
    max_age: Option<String>,
}

impl CorsPolicy {
    /// Build a policy. A `*` anywhere in `origins` allows every origin.
    pub fn new<I, S>(origins: I, max_age: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = origins
            .into_iter()
            .map(Into::into)
            .filter(|o| !o.is_empty())
            .collect();
        let origins = if list.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            list.sort();
            list.dedup();
            AllowedOrigins::List(list)
        };
        Self {
            origins,
            max_age: max_age.filter(|v| !v.is_empty()),
        }
    }

    /// A policy that never emits CORS headers.
    pub fn disabled() -> Self {
        Self::new(Vec::<String>::new(), None)
    }

    pub fn origins(&self) -> &AllowedOrigins {
        &self.origins
    }

    pub fn max_age(&self) -> Option<&str> {
        self.max_age.as_deref()
    }

    /// Value for `access-control-allow-origin` given the request's origin,
    /// or `None` when the origin is not allowed.
    pub fn allow_origin<'a>(&'a self, origin: &'a str) -> Option<&'a str> {
        match &self.origins {
            AllowedOrigins::Any => Some("*"),
            AllowedOrigins::List(list) => list
                .binary_search_by(|o| o.as_str().cmp(origin))
                .ok()
                .map(|_| origin),
        }
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Build the response for `object` as requested with `method` and request
/// headers `req`.
///
/// Metadata becomes response headers. Redirect objects answer with
/// `location` and their redirect status (except for OPTIONS), and only GET
/// carries the body. The object's body is dropped unread for every other
/// outcome.
pub fn serve_object(cors: &CorsPolicy, method: &Method, req: &HeaderMap, object: Object) -> Response {
    let mut headers = HeaderMap::new();
    for (k, v) in object.meta() {
        match (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %k, "skipping metadata that is not a valid header"),
        }
    }
    headers.insert(header::ALLOW, HeaderValue::from_static(ALLOW_METHODS));
    apply_cors(cors, method, req, &mut headers);

    if *method != Method::OPTIONS {
        if let Some(target) = object.redirect() {
            let status = StatusCode::from_u16(object.redirect_code())
                .unwrap_or(StatusCode::MOVED_PERMANENTLY);
            match HeaderValue::from_str(target) {
                Ok(v) => {
                    headers.insert(header::LOCATION, v);
                }
                Err(_) => warn!(%target, "redirect target is not a valid header value"),
            }
            return build(status, headers, Body::empty());
        }
    }

    let body = if *method == Method::GET {
        Body::from_stream(object.into_body())
    } else {
        Body::empty()
    };
    build(StatusCode::OK, headers, body)
}

/// Log body errors against `label` as they pass through to the client.
pub fn log_body_errors(body: ByteStream, label: String) -> ByteStream {
    body.inspect_err(move |e| error!(object = %label, error = %e, "streaming object body"))
        .boxed()
}

fn apply_cors(cors: &CorsPolicy, method: &Method, req: &HeaderMap, headers: &mut HeaderMap) {
    let origin = req
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let Some(allowed) = cors.allow_origin(origin) else {
        return;
    };
    let Ok(allowed) = HeaderValue::from_str(allowed) else {
        return;
    };
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed);

    if *method != Method::OPTIONS {
        return;
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    let requested = req
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSE_HEADERS),
    );
    if let Some(v) = cors.max_age().and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, v);
    }
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}
