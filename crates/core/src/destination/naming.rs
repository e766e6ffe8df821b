//! Destination object naming and public URL rules.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Folder used when an account has no root folder configured.
pub const DEFAULT_ROOT_FOLDER: &str = "cloudinary-sync";

static SCHEME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").ok());

/// Destination file name for a source object.
///
/// Characters outside `[A-Za-z0-9_-]` become `_`; the format is appended as
/// the extension (`jpg` when unknown).
pub fn sanitize_file_name(public_id: &str, format: &str) -> String {
    let stem: String = public_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let ext = if format.is_empty() { "jpg" } else { format };
    format!("{}.{}", stem, ext)
}

/// Remove a leading URL scheme such as `https://`.
pub fn strip_scheme(host: &str) -> &str {
    match SCHEME.as_ref().and_then(|re| re.find(host)) {
        Some(m) => &host[m.end()..],
        None => host,
    }
}

/// `https://<pull zone>/<folder>/<file>` with the pull zone's scheme and
/// trailing slashes removed. The file name is percent-encoded the same way
/// as in storage URLs.
pub fn public_url(pull_zone: &str, folder: &str, file_name: &str) -> String {
    let host = strip_scheme(pull_zone.trim()).trim_end_matches('/');
    let folder = folder.trim_matches('/');
    let file_name = urlencoding::encode(file_name);
    if folder.is_empty() {
        format!("https://{}/{}", host, file_name)
    } else {
        format!("https://{}/{}/{}", host, folder, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(
            sanitize_file_name("folder/my photo.v2", "png"),
            "folder_my_photo_v2.png"
        );
        assert_eq!(sanitize_file_name("abc-DEF_123", "jpg"), "abc-DEF_123.jpg");
        assert_eq!(sanitize_file_name("café", ""), "caf_.jpg");
    }

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("https://cdn.example.com"), "cdn.example.com");
        assert_eq!(strip_scheme("git+ssh://host"), "host");
        assert_eq!(strip_scheme("cdn.example.com"), "cdn.example.com");
        assert_eq!(strip_scheme("1http://x"), "1http://x");
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            public_url("https://zone.b-cdn.net/", "cloudinary-sync", "a.jpg"),
            "https://zone.b-cdn.net/cloudinary-sync/a.jpg"
        );
        assert_eq!(
            public_url("zone.b-cdn.net", "", "a.jpg"),
            "https://zone.b-cdn.net/a.jpg"
        );
    }

    #[test]
    fn test_public_url_encodes_file_name() {
        assert_eq!(
            public_url("zone.b-cdn.net", "media", "my photo#1.jpg"),
            "https://zone.b-cdn.net/media/my%20photo%231.jpg"
        );
        assert_eq!(
            public_url("zone.b-cdn.net", "media", "a-b_c.jpg"),
            "https://zone.b-cdn.net/media/a-b_c.jpg"
        );
    }
}
