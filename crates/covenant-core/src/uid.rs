//! Stable filing identifiers.

use uuid::Uuid;

/// Derive the stable identifier for a filing document.
///
/// UUIDv5 in the URL namespace over `"<accession>|<url>"`, rendered as 32
/// lowercase hex digits. The same document found again (on a later page,
/// in another year, or on a re-run) always gets the same uid; two exhibits
/// of one accession differ by URL and so get different uids.
pub fn filing_uid(accession_no: &str, url: &str) -> String {
    let name = format!("{accession_no}|{url}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
        .simple()
        .to_string()
}
