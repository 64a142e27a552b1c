use chrono::{DateTime, Utc};

/// RFC 7231 IMF-fixdate layout, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Current time formatted for an HTTP `Date` header
pub fn http_date() -> String {
    http_date_at(Utc::now())
}

/// Format the given instant for an HTTP `Date` header
pub fn http_date_at(at: DateTime<Utc>) -> String {
    at.format(IMF_FIXDATE).to_string()
}
