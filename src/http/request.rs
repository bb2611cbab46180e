//! Request line parsing

use std::borrow::Cow;

/// Default index key served for `/`
pub const DEFAULT_INDEX: &str = "index.html";

/// Maximum bytes read for a request
pub const REQUEST_BUFFER_SIZE: usize = 4096;

/// The parts of an HTTP request line that the server looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: Option<String>,
}

impl Request {
    /// Parse the first line of a raw request.
    ///
    /// Returns `None` if the line has no method and target.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(raw);
        let line = text.lines().next()?;
        let mut parts = line.split_whitespace();

        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();
        let version = parts.next().map(str::to_string);

        Some(Self {
            method,
            target,
            version,
        })
    }

    /// Resource key for this request's target, see [`normalize_target`]
    pub fn resource_key(&self, index: &str) -> String {
        normalize_target(&self.target, index)
    }
}

/// Map a request target to a resource key.
///
/// Drops query and fragment, percent-decodes, maps `/` to `index` and strips
/// the leading separator.
pub fn normalize_target(target: &str, index: &str) -> String {
    let path = target
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));

    match decoded.trim_start_matches('/') {
        "" => index.to_string(),
        rest => rest.to_string(),
    }
}
