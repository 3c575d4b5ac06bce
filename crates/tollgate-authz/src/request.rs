//! Inbound request and caller descriptions handed to the authorizers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::decision::{AUTHORIZATION_HEADER, REQUEST_ID_HEADER};

/// The only headers that appear in a serialized [`RequestInfo`].
pub const FORWARDED_HEADERS: [&str; 2] = [REQUEST_ID_HEADER, AUTHORIZATION_HEADER];

/// The parts of an inbound HTTP request the authorizers look at.
///
/// Built once per request by the gateway and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestInfo {
    /// HTTP method.
    pub method: String,
    /// Request path, without query string.
    pub path: String,
    /// Full request URL, used only to decompose the URI for decision requests.
    #[serde(skip)]
    pub full_url: String,
    /// Request headers with their original casing.
    ///
    /// Only [`FORWARDED_HEADERS`] are serialized; everything else stays in
    /// the gateway.
    #[serde(
        serialize_with = "serialize_forwarded",
        skip_serializing_if = "has_no_forwarded"
    )]
    pub headers: IndexMap<String, String>,
}

impl RequestInfo {
    /// Create request info for a method and path.
    ///
    /// The full URL defaults to the path.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method: method.into(),
            full_url: path.clone(),
            path,
            headers: IndexMap::new(),
        }
    }

    /// Set the full request URL.
    #[must_use]
    pub fn with_full_url(mut self, url: impl Into<String>) -> Self {
        self.full_url = url.into();
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Look up a header.
    ///
    /// An exact name match wins; otherwise the first header whose name matches
    /// ignoring ASCII case is returned.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The [`FORWARDED_HEADERS`] present on this request, under their
    /// canonical names.
    pub fn forwarded_headers(&self) -> IndexMap<&'static str, &str> {
        forwarded(&self.headers)
    }
}

fn find_header<'a>(headers: &'a IndexMap<String, String>, name: &str) -> Option<&'a str> {
    if let Some(value) = headers.get(name) {
        return Some(value);
    }
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn forwarded(headers: &IndexMap<String, String>) -> IndexMap<&'static str, &str> {
    FORWARDED_HEADERS
        .iter()
        .filter_map(|&name| find_header(headers, name).map(|value| (name, value)))
        .collect()
}

fn serialize_forwarded<S: Serializer>(
    headers: &IndexMap<String, String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    forwarded(headers).serialize(serializer)
}

fn has_no_forwarded(headers: &IndexMap<String, String>) -> bool {
    forwarded(headers).is_empty()
}

/// An already-authenticated caller.
///
/// The default value is the anonymous caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Principal {
    /// Stable user identifier.
    pub user_id: String,
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
}

impl Principal {
    /// Create a principal from its three identity fields.
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            email: email.into(),
        }
    }

    /// Whether this is the anonymous caller.
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }

    /// Identifier suitable for logs; never includes the email.
    pub fn log_id(&self) -> String {
        if self.is_anonymous() {
            "anonymous".to_string()
        } else {
            format!("user:{}", self.user_id)
        }
    }
}
