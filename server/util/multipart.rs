/// One section of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq)]
pub struct Part<'a> {
    pub name: String,
    /// Present for file uploads.
    pub filename: Option<String>,
    pub data: &'a [u8],
}

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`.
fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// Reads `key="..."` out of a Content-Disposition header. `key` must be
/// preceded by `;` or whitespace so `name=` does not match `filename=`.
fn disposition_param(headers: &str, key: &str) -> Option<String> {
    let pattern = format!("{}=\"", key);
    let mut search = 0;
    while let Some(offset) = headers[search..].find(&pattern) {
        let pos = search + offset;
        let preceded_ok = headers[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| c == ';' || c.is_whitespace());
        let rest = &headers[pos + pattern.len()..];
        if preceded_ok {
            let end = rest.find('"')?;
            return Some(rest[..end].to_owned());
        }
        search = pos + pattern.len();
    }
    None
}

/// Splits a multipart body into its named parts. Sections without a
/// header block or a `name` are skipped.
pub fn parse_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{}", boundary);
    let sep = b"\r\n\r\n";
    let mut parts = Vec::new();

    for section in split_on(body, delimiter.as_bytes()) {
        let Some(sep_pos) = find_subsequence(section, sep) else {
            continue;
        };
        let headers = String::from_utf8_lossy(&section[..sep_pos]);
        let Some(name) = disposition_param(&headers, "name") else {
            continue;
        };
        let raw = &section[sep_pos + sep.len()..];
        parts.push(Part {
            name,
            filename: disposition_param(&headers, "filename"),
            data: raw.strip_suffix(b"\r\n").unwrap_or(raw),
        });
    }
    parts
}

/// Bytes of the file part called `field_name`.
pub fn file_field<'a>(parts: &[Part<'a>], field_name: &str) -> Option<&'a [u8]> {
    parts
        .iter()
        .find(|p| p.name == field_name && p.filename.is_some())
        .map(|p| p.data)
}

/// Value of the text (non-file) part called `field_name`.
pub fn text_field(parts: &[Part<'_>], field_name: &str) -> Option<String> {
    parts
        .iter()
        .find(|p| p.name == field_name && p.filename.is_none())
        .and_then(|p| String::from_utf8(p.data.to_vec()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"--XyZ\r\nContent-Disposition: form-data; name=\"target_class\"\r\n\r\n1\r\n");
        b.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"image\"; filename=\"eye.png\"\r\n\
              Content-Type: image/png\r\n\r\n\x89PNG\r\n\x1a\n\x00\x01\r\n",
        );
        b.extend_from_slice(b"--XyZ--\r\n");
        b
    }

    #[test]
    fn boundary_is_extracted() {
        assert_eq!(extract_boundary("multipart/form-data; boundary=XyZ").as_deref(), Some("XyZ"));
        assert_eq!(extract_boundary("multipart/form-data; boundary=\"q\"").as_deref(), Some("q"));
        assert_eq!(extract_boundary("multipart/form-data"), None);
    }

    #[test]
    fn fields_are_found_by_name() {
        let body = body();
        let parts = parse_parts(&body, "XyZ");
        assert_eq!(parts.len(), 2);
        assert_eq!(text_field(&parts, "target_class").as_deref(), Some("1"));
        assert_eq!(file_field(&parts, "image"), Some(&b"\x89PNG\r\n\x1a\n\x00\x01"[..]));
        assert_eq!(parts[1].filename.as_deref(), Some("eye.png"));
        assert!(file_field(&parts, "target_class").is_none());
        assert!(text_field(&parts, "image").is_none());
    }

    #[test]
    fn filename_is_not_mistaken_for_name() {
        let headers = "Content-Disposition: form-data; filename=\"a.png\"; name=\"image\"";
        assert_eq!(disposition_param(headers, "name").as_deref(), Some("image"));
        assert_eq!(disposition_param(headers, "filename").as_deref(), Some("a.png"));
    }
}
