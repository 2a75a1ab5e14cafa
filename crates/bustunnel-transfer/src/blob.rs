//! Blob naming.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters escaped in blob names: everything except RFC 3986 unreserved.
const BLOB_NAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Name of the blob that holds the file at `path`.
///
/// ```
/// use bustunnel_transfer::blob_name;
///
/// assert_eq!(blob_name("/data/a b.bin"), "%2Fdata%2Fa%20b.bin");
/// ```
#[must_use]
pub fn blob_name(path: &str) -> String {
    utf8_percent_encode(path, BLOB_NAME_ESCAPE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_keep_unreserved_characters() {
        assert_eq!(blob_name("report-2024_v1.0~x"), "report-2024_v1.0~x");
    }

    #[test]
    fn test_should_escape_separators_and_unicode() {
        assert_eq!(blob_name("C:\\tmp\\ü.txt"), "C%3A%5Ctmp%5C%C3%BC.txt");
        assert_ne!(blob_name("a/b"), blob_name("a_b"));
    }
}
