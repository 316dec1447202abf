use time::format_description::well_known::Rfc3339;
use time::{format_description, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::domain::ValidationWarning;

// Naive formats accepted from upstream exports. Each is interpreted as UTC with a warning.
const NAIVE_FORMATS: [&str; 4] = [
    "[year]-[month]-[day]T[hour]:[minute]:[second]",
    "[year]-[month]-[day] [hour]:[minute]:[second]",
    "[year]-[month]-[day]T[hour]:[minute]",
    "[year]-[month]-[day] [hour]:[minute]",
];

fn to_rfc3339_utc(dt: OffsetDateTime) -> Option<String> {
    dt.to_offset(UtcOffset::UTC).format(&Rfc3339).ok()
}

fn parse_naive_as_utc(raw: &str) -> Option<(String, &'static str)> {
    for fmt in NAIVE_FORMATS {
        let Ok(items) = format_description::parse(fmt) else {
            continue;
        };
        if let Ok(pdt) = PrimitiveDateTime::parse(raw, &items) {
            if let Some(canon) = to_rfc3339_utc(pdt.assume_utc()) {
                return Some((canon, fmt));
            }
        }
    }
    None
}

/// Canonicalize an order timestamp to RFC3339 UTC.
///
/// Returns `None` (with an `INGEST_TS_UNPARSEABLE` warning) when the value matches neither
/// RFC3339 nor the naive allowlist. Naive values are assumed UTC and flagged with
/// `INGEST_TS_TZ_ASSUMED_UTC`.
pub fn canonicalize_timestamp(
    field: &str,
    raw_input: &str,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<String> {
    let trimmed = raw_input.trim();
    if trimmed.is_empty() {
        warnings.push(ValidationWarning::new(
            "INGEST_TS_MISSING",
            format!("Missing timestamp for {field}"),
        ));
        return None;
    }

    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return to_rfc3339_utc(dt);
    }

    if let Some((canon, fmt)) = parse_naive_as_utc(trimmed) {
        warnings.push(
            ValidationWarning::new(
                "INGEST_TS_TZ_ASSUMED_UTC",
                format!("Assumed UTC timezone for {field}"),
            )
            .with_details(format!("value={trimmed}; fmt={fmt}; canonical={canon}")),
        );
        return Some(canon);
    }

    warnings.push(
        ValidationWarning::new(
            "INGEST_TS_UNPARSEABLE",
            format!("Unparseable timestamp for {field}"),
        )
        .with_details(format!("raw={trimmed}")),
    );
    None
}

#[cfg(test)]
mod tests {
    use super::canonicalize_timestamp;

    #[test]
    fn rfc3339_offsets_are_shifted_to_utc() {
        let mut w = Vec::new();
        let got = canonicalize_timestamp("created_at", "2025-01-10T10:15:00+01:00", &mut w);
        assert_eq!(got.as_deref(), Some("2025-01-10T09:15:00Z"));
        assert!(w.is_empty());
    }

    #[test]
    fn naive_values_assume_utc_and_warn() {
        let mut w = Vec::new();
        let got = canonicalize_timestamp("created_at", "2025-01-10 09:15:00", &mut w);
        assert_eq!(got.as_deref(), Some("2025-01-10T09:15:00Z"));
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].code, "INGEST_TS_TZ_ASSUMED_UTC");
    }

    #[test]
    fn garbage_is_rejected_with_warning() {
        let mut w = Vec::new();
        assert!(canonicalize_timestamp("created_at", "last tuesday", &mut w).is_none());
        assert_eq!(w[0].code, "INGEST_TS_UNPARSEABLE");
    }
}
