//! ABOUTME: Timestamp helper for persisted records
//! ABOUTME: All stored times are RFC3339 strings in UTC

use ::time::format_description::well_known::Rfc3339;
use ::time::OffsetDateTime;

/// Current UTC time as an RFC3339 string, the format every repository writes
/// into created_at/updated_at columns.
pub fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
