use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

static DATA_URL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([^;,]+);base64,").expect("data url regex to be valid"));

static IMAGE_DATA_URL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(image/\w+);base64,").expect("image data url regex to be valid")
});

/// Base64 payload with its declared mime type, if a `data:` prefix was present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineImage<'a> {
    pub mime_type: Option<&'a str>,
    pub data: &'a str,
}

/// Split a `data:<mime>;base64,` prefix off a base64 string
pub fn strip_data_url_prefix(raw: &str) -> InlineImage<'_> {
    split_prefix(&DATA_URL_PREFIX, raw)
}

/// Like [`strip_data_url_prefix`], but only `data:image/<subtype>;base64,`
/// prefixes are recognised; anything else is kept as part of the data
pub fn strip_image_data_url_prefix(raw: &str) -> InlineImage<'_> {
    split_prefix(&IMAGE_DATA_URL_PREFIX, raw)
}

fn split_prefix<'a>(pattern: &Regex, raw: &'a str) -> InlineImage<'a> {
    match pattern.captures(raw) {
        Some(caps) => {
            let prefix_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
            InlineImage {
                mime_type: caps.get(1).map(|m| m.as_str()),
                data: &raw[prefix_len..],
            }
        }
        None => InlineImage {
            mime_type: None,
            data: raw,
        },
    }
}

/// Everything after the first comma, or the input when there is none
/// (or nothing follows it).
pub fn payload_after_comma(raw: &str) -> &str {
    match raw.split_once(',') {
        Some((_, rest)) if !rest.is_empty() => rest.split(',').next().unwrap_or(rest),
        _ => raw,
    }
}

pub fn to_data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

pub fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_data_url_prefix() {
        let inline = strip_data_url_prefix("data:image/jpeg;base64,AAAA");
        assert_eq!(inline.mime_type, Some("image/jpeg"));
        assert_eq!(inline.data, "AAAA");

        let bare = strip_data_url_prefix("AAAA");
        assert_eq!(bare.mime_type, None);
        assert_eq!(bare.data, "AAAA");
    }

    #[test]
    fn test_image_prefix_only_strips_images() {
        let inline = strip_image_data_url_prefix("data:image/webp;base64,AAAA");
        assert_eq!(inline.mime_type, Some("image/webp"));
        assert_eq!(inline.data, "AAAA");

        let pdf = strip_image_data_url_prefix("data:application/pdf;base64,AAAA");
        assert_eq!(pdf.mime_type, None);
        assert_eq!(pdf.data, "data:application/pdf;base64,AAAA");

        let svg = strip_image_data_url_prefix("data:image/svg+xml;base64,AAAA");
        assert_eq!(svg.mime_type, None);
    }

    #[test]
    fn test_payload_after_comma() {
        assert_eq!(payload_after_comma("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(payload_after_comma("QUJD"), "QUJD");
        assert_eq!(payload_after_comma("QUJD,"), "QUJD,");
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://res.cloudinary.com/demo/image/upload/room.jpg"));
        assert!(is_http_url("HTTP://example.com/art.png"));
        assert!(!is_http_url("ftp://example.com/art.png"));
        assert!(!is_http_url("data:image/png;base64,AAAA"));
        assert!(!is_http_url("example.com/art.png"));
    }
}
