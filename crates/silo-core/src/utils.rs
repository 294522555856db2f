//! Utility functions

use uuid::Uuid;

/// Generate a unique request ID
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string().replace('-', "").to_uppercase()
}

/// Generate a version ID for a versioned object write
pub fn generate_version_id() -> String {
    Uuid::new_v4().to_string()
}

/// Quote an ETag for headers and XML
pub fn quote_etag(etag: &str) -> String {
    format!("\"{}\"", etag)
}

/// Strip surrounding quotes from a client-supplied ETag
pub fn unquote_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// XML escape string
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Format datetime for S3 XML responses
pub fn format_s3_datetime(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Format datetime for HTTP headers
pub fn format_http_datetime(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_etag_quoting_round_trip() {
        let quoted = quote_etag("65a8e27d8879283831b664bd8b7f0ad4");
        assert_eq!(quoted, "\"65a8e27d8879283831b664bd8b7f0ad4\"");
        assert_eq!(unquote_etag(&quoted), "65a8e27d8879283831b664bd8b7f0ad4");
    }

    #[test]
    fn test_datetime_formats() {
        let dt = chrono::Utc.with_ymd_and_hms(2013, 5, 24, 0, 0, 0).unwrap();
        assert_eq!(format_s3_datetime(&dt), "2013-05-24T00:00:00.000Z");
        assert_eq!(format_http_datetime(&dt), "Fri, 24 May 2013 00:00:00 GMT");
    }

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
