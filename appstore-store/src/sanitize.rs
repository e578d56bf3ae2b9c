//! # Filename sanitization
//!
//! Client-supplied file names are reduced to their final path segment and
//! stripped of characters that are unsafe in file names on common platforms.

/// Characters removed from every file name
pub const DISALLOWED_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Sanitize a client-supplied file name.
///
/// Only the last segment after any `/` or `\` is kept. Disallowed characters
/// and control characters are removed and surrounding whitespace trimmed.
/// Names made only of dots collapse to the empty string. Never fails: an
/// empty result means there was no usable name, which callers must reject.
///
/// # Examples
///
/// ```
/// # use appstore_store::sanitize::sanitize_filename;
/// assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
/// assert_eq!(sanitize_filename("C:\\Users\\me\\setup.exe"), "setup.exe");
/// assert_eq!(sanitize_filename("what?.zip"), "what.zip");
/// assert_eq!(sanitize_filename("dir/"), "");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let last_segment = name.rsplit(['/', '\\']).next().unwrap_or("");

    let cleaned: String = last_segment
        .chars()
        .filter(|c| !DISALLOWED_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.chars().all(|c| c == '.') {
        return String::new();
    }

    cleaned.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_directory_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename("/abs/path/app.tar.gz"), "app.tar.gz");
    }

    #[test]
    fn test_removes_disallowed_characters() {
        let cleaned = sanitize_filename("a/b\\c:d");
        assert!(!cleaned.contains(DISALLOWED_CHARS));
        assert!(!cleaned.contains(".."));
        assert_eq!(cleaned, "cd");

        assert_eq!(sanitize_filename("r*e?p<o>r|t\".pdf"), "report.pdf");
    }

    #[test]
    fn test_removes_control_characters() {
        assert_eq!(sanitize_filename("evil\0name\n.bin"), "evilname.bin");
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(sanitize_filename(""), "");
        assert_eq!(sanitize_filename("***"), "");
        assert_eq!(sanitize_filename("dir/"), "");
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("a/.."), "");
        assert_eq!(sanitize_filename("   "), "");
    }

    #[test]
    fn test_keeps_ordinary_names() {
        assert_eq!(sanitize_filename("MyApp-1.2.3.apk"), "MyApp-1.2.3.apk");
        assert_eq!(sanitize_filename("应用.zip"), "应用.zip");
        assert_eq!(sanitize_filename(".hidden"), ".hidden");
    }
}
