//! Best-effort normalization of raw feed bytes into UTF-8 text.
//!
//! Feeds in the wild arrive with byte-order marks, legacy charsets declared
//! in the XML prologue, and stray surrounding whitespace. This stage never
//! fails: anything it cannot make sense of passes through lossily and is
//! left for the parser to accept or reject.

use regex::Regex;
use std::sync::OnceLock;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// How many bytes of the document can contain the XML declaration. The
/// declaration must open the document, so a short prefix is enough.
const PROLOGUE_WINDOW: usize = 256;

fn declared_encoding_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)^<\?xml[^>]+encoding=["']([^"']+)["']"#).expect("static pattern")
    })
}

/// Normalizes a raw response body into trimmed UTF-8 XML text.
///
/// Steps, in order: trim surrounding whitespace (empty input short-circuits
/// to an empty string), strip a UTF-8 BOM, convert from the charset declared
/// in the XML prologue when it is not already UTF-8, trim again.
///
/// Unknown or malformed encoding declarations degrade to a lossy UTF-8 read
/// of the original bytes; this function never errors.
pub fn normalize_xml(raw: &[u8]) -> String {
    let mut bytes = raw.trim_ascii();
    if bytes.is_empty() {
        return String::new();
    }

    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        bytes = rest;
    }

    let text = match declared_encoding(bytes) {
        Some(label) if !label.eq_ignore_ascii_case("UTF-8") => decode_from(bytes, &label),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    text.trim().to_owned()
}

/// Reads the `encoding` attribute out of the XML declaration, if any.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let window = &bytes[..bytes.len().min(PROLOGUE_WINDOW)];
    let prologue = String::from_utf8_lossy(window);
    declared_encoding_pattern()
        .captures(&prologue)
        .map(|captures| captures[1].to_owned())
}

fn decode_from(bytes: &[u8], label: &str) -> String {
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        // Unrecognized label: keep the bytes as they are rather than fail the fetch
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_xml(b""), "");
        assert_eq!(normalize_xml(b"   \n\t  "), "");
    }

    #[test]
    fn strips_utf8_bom() {
        let input = b"\xEF\xBB\xBF<?xml version=\"1.0\"?><rss/>";
        assert_eq!(normalize_xml(input), "<?xml version=\"1.0\"?><rss/>");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let input = b"\n  <rss></rss>  \n";
        assert_eq!(normalize_xml(input), "<rss></rss>");
    }

    #[test]
    fn converts_declared_latin1() {
        // "café" with an e-acute encoded as a single 0xE9 byte
        let mut input =
            b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><rss><channel><title>caf".to_vec();
        input.push(0xE9);
        input.extend_from_slice(b"</title></channel></rss>");

        let normalized = normalize_xml(&input);
        assert!(normalized.contains("café"), "got: {normalized}");
    }

    #[test]
    fn declared_utf8_passes_through() {
        let input = "<?xml version=\"1.0\" encoding=\"utf-8\"?><rss><channel><title>héllo</title></channel></rss>";
        assert_eq!(normalize_xml(input.as_bytes()), input);
    }

    #[test]
    fn unknown_encoding_label_passes_through() {
        let input = b"<?xml version=\"1.0\" encoding=\"NO-SUCH-CHARSET\"?><rss/>";
        assert_eq!(
            normalize_xml(input),
            "<?xml version=\"1.0\" encoding=\"NO-SUCH-CHARSET\"?><rss/>"
        );
    }

    #[test]
    fn missing_declaration_passes_through() {
        let input = b"<rss version=\"2.0\"><channel/></rss>";
        assert_eq!(normalize_xml(input), "<rss version=\"2.0\"><channel/></rss>");
    }
}
