//! HLS playlist rewriting
//!
//! Every reference in a playlist (bare URI lines and `URI="..."` attributes
//! of directives) is resolved against the playlist's own URL and wrapped into
//! a same-origin callback URL, so the player fetches segments, keys and
//! sub-playlists through the relay.
//!
//! Wrapped references carry an explicit `relay=v1` marker. Rewriting an
//! already rewritten playlist unwraps the marker first, so references are
//! never nested.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

/// Query parameter marking a reference as relayed
pub const MARKER_KEY: &str = "relay";
/// Current marker version
pub const MARKER_VERSION: &str = "v1";
/// Query parameter holding the upstream URL
pub const TARGET_KEY: &str = "url";

const PLAYLIST_HEADER: &str = "#EXTM3U";
const URI_ATTRIBUTE: &str = "URI=\"";

/// Unreserved characters stay literal, everything else is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("document does not start with {PLAYLIST_HEADER}")]
    NotAPlaylist,
}

/// One physical line of a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestLine<'a> {
    /// Line content without its terminator
    pub raw: &'a str,
    /// `"\n"`, `"\r\n"` or `""` for a final unterminated line
    pub terminator: &'a str,
}

impl<'a> ManifestLine<'a> {
    fn split(chunk: &'a str) -> Self {
        let (raw, terminator) = if let Some(raw) = chunk.strip_suffix("\r\n") {
            (raw, "\r\n")
        } else if let Some(raw) = chunk.strip_suffix('\n') {
            (raw, "\n")
        } else {
            (chunk, "")
        };
        Self { raw, terminator }
    }

    /// Iterate the lines of `document`, keeping their terminators
    pub fn parse(document: &'a str) -> impl Iterator<Item = ManifestLine<'a>> {
        document.split_inclusive('\n').map(Self::split)
    }

    #[must_use]
    pub fn trimmed(&self) -> &'a str {
        self.raw.trim()
    }

    #[must_use]
    pub fn is_directive(&self) -> bool {
        self.trimmed().starts_with('#')
    }

    #[must_use]
    pub fn is_uri_bearing(&self) -> bool {
        !self.is_directive() && !self.trimmed().is_empty()
    }
}

/// Builds and recognizes relay callback URLs
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    public_path: String,
}

impl ProxyRoute {
    /// `public_path` is what players request, e.g. `/proxy` or
    /// `https://relay.example.com/proxy`.
    pub fn new(public_path: impl Into<String>) -> Self {
        Self {
            public_path: public_path.into(),
        }
    }

    #[must_use]
    pub fn public_path(&self) -> &str {
        &self.public_path
    }

    /// Wrap an absolute upstream URL
    #[must_use]
    pub fn wrap(&self, target: &Url) -> String {
        format!(
            "{}?{MARKER_KEY}={MARKER_VERSION}&{TARGET_KEY}={}",
            self.public_path,
            utf8_percent_encode(target.as_str(), QUERY_VALUE)
        )
    }

    /// The upstream URL carried by a wrapped reference, if `candidate` is one
    #[must_use]
    pub fn unwrap(candidate: &Url) -> Option<Url> {
        let mut marked = false;
        let mut target = None;
        for (key, value) in candidate.query_pairs() {
            match key.as_ref() {
                MARKER_KEY => marked |= value == MARKER_VERSION,
                TARGET_KEY => target = Some(value.into_owned()),
                _ => {}
            }
        }
        if !marked {
            return None;
        }
        Url::parse(&target?).ok().filter(is_http)
    }

    /// Resolve `reference` against `base` and wrap it. `None` leaves the
    /// reference untouched: it could not be resolved or is not HTTP(S).
    #[must_use]
    pub fn proxied_reference(&self, reference: &str, base: &Url) -> Option<String> {
        let resolved = base.join(reference).ok()?;
        let target = Self::unwrap(&resolved).unwrap_or(resolved);
        is_http(&target).then(|| self.wrap(&target))
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Rewrite `document`, falling back to the unmodified document on failure.
#[must_use]
pub fn rewrite(document: &str, base: &Url, route: &ProxyRoute) -> String {
    match try_rewrite(document, base, route) {
        Ok(rewritten) => rewritten,
        Err(e) => {
            tracing::warn!(url = %base, error = %e, "Playlist rewrite failed, serving original");
            document.to_string()
        }
    }
}

/// Rewrite every reference of `document` through `route`.
pub fn try_rewrite(document: &str, base: &Url, route: &ProxyRoute) -> Result<String, RewriteError> {
    if !document
        .trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with(PLAYLIST_HEADER)
    {
        return Err(RewriteError::NotAPlaylist);
    }

    let mut output = String::with_capacity(document.len() + document.len() / 2);
    for line in ManifestLine::parse(document) {
        if line.is_directive() {
            match rewrite_uri_attributes(line.raw, base, route) {
                Some(rewritten) => output.push_str(&rewritten),
                None => output.push_str(line.raw),
            }
        } else if line.is_uri_bearing() {
            match route.proxied_reference(line.trimmed(), base) {
                Some(proxied) => output.push_str(&proxied),
                None => output.push_str(line.raw),
            }
        } else {
            output.push_str(line.raw);
        }
        output.push_str(line.terminator);
    }

    Ok(output)
}

/// Rewrite the quoted value of each `URI="..."` attribute of a directive.
/// Returns `None` when a quote is left unclosed.
fn rewrite_uri_attributes(line: &str, base: &Url, route: &ProxyRoute) -> Option<String> {
    let mut result = String::with_capacity(line.len());
    let mut remaining = line;

    while let Some(start) = find_attribute(remaining) {
        let value_start = start + URI_ATTRIBUTE.len();
        result.push_str(&remaining[..value_start]);
        remaining = &remaining[value_start..];

        let end = remaining.find('"')?;
        let uri = &remaining[..end];
        match route.proxied_reference(uri, base) {
            Some(proxied) => result.push_str(&proxied),
            None => result.push_str(uri),
        }
        result.push('"');
        remaining = &remaining[end + 1..];
    }

    result.push_str(remaining);
    Some(result)
}

/// Position of the next `URI="` that starts an attribute name
fn find_attribute(haystack: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = haystack[offset..].find(URI_ATTRIBUTE) {
        let at = offset + pos;
        if at == 0 || matches!(haystack.as_bytes()[at - 1], b':' | b',' | b' ') {
            return Some(at);
        }
        offset = at + URI_ATTRIBUTE.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://origin/live/index.m3u8").unwrap()
    }

    fn route() -> ProxyRoute {
        ProxyRoute::new("/proxy")
    }

    #[test]
    fn test_relative_segment_is_wrapped() {
        let doc = "#EXTM3U\n#EXTINF:4.0,\nseg1.ts\n";
        let out = rewrite(doc, &base(), &route());
        assert_eq!(
            out,
            "#EXTM3U\n#EXTINF:4.0,\n/proxy?relay=v1&url=https%3A%2F%2Forigin%2Flive%2Fseg1.ts\n"
        );
    }

    #[test]
    fn test_wrapped_reference_unwraps_to_resolved_url() {
        let doc = "#EXTM3U\n../other/seg 2.ts?token=a&b=c\n";
        let out = rewrite(doc, &base(), &route());
        let line = out.lines().nth(1).unwrap();

        let wrapped = Url::parse("http://relay.local").unwrap().join(line).unwrap();
        let target = ProxyRoute::unwrap(&wrapped).unwrap();
        assert_eq!(
            target,
            base().join("../other/seg 2.ts?token=a&b=c").unwrap()
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let doc = "#EXTM3U\n\
                   #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x01\n\
                   #EXTINF:4.0,\n\
                   seg1.ts\n\
                   https://cdn.example/abs/seg2.ts\n";
        let once = rewrite(doc, &base(), &route());

        let other_base = Url::parse("http://relay.local:8000/proxy?url=x").unwrap();
        let twice = rewrite(&once, &other_base, &route());
        assert_eq!(once, twice);
        assert!(!twice.contains("relay%3Dv1"));
    }

    #[test]
    fn test_directives_without_uri_are_untouched() {
        let doc = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:120\n#EXT-X-ENDLIST\n";
        assert_eq!(rewrite(doc, &base(), &route()), doc);
    }

    #[test]
    fn test_uri_attributes_are_rewritten_in_place() {
        let doc = "#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\",BYTERANGE=\"720@0\"\n";
        let out = rewrite(doc, &base(), &route());
        assert_eq!(
            out,
            "#EXTM3U\n#EXT-X-MAP:URI=\"/proxy?relay=v1&url=https%3A%2F%2Forigin%2Flive%2Finit.mp4\",BYTERANGE=\"720@0\"\n"
        );
    }

    #[test]
    fn test_media_and_iframe_attributes() {
        let doc = "#EXTM3U\n\
                   #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"en\",URI=\"audio/en.m3u8\"\n\
                   #EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=86000,URI=\"iframe.m3u8\"\n";
        let out = rewrite(doc, &base(), &route());
        assert!(out.contains("URI=\"/proxy?relay=v1&url=https%3A%2F%2Forigin%2Flive%2Faudio%2Fen.m3u8\""));
        assert!(out.contains("URI=\"/proxy?relay=v1&url=https%3A%2F%2Forigin%2Flive%2Fiframe.m3u8\""));
        assert!(out.contains("GROUP-ID=\"aud\""));
    }

    #[test]
    fn test_unclosed_quote_passes_through() {
        let doc = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\n";
        assert_eq!(rewrite(doc, &base(), &route()), doc);
    }

    #[test]
    fn test_non_http_references_pass_through() {
        let doc = "#EXTM3U\n#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://key-id\",KEYFORMAT=\"com.apple.streamingkeydelivery\"\n";
        assert_eq!(rewrite(doc, &base(), &route()), doc);
    }

    #[test]
    fn test_line_terminators_are_preserved() {
        let doc = "#EXTM3U\r\n#EXTINF:4.0,\r\nseg1.ts\r\n   \r\nseg2.ts";
        let out = rewrite(doc, &base(), &route());
        let lines: Vec<_> = ManifestLine::parse(&out).collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].terminator, "\r\n");
        assert_eq!(lines[3].raw, "   ");
        assert_eq!(lines[4].terminator, "");
        assert!(lines[4].raw.ends_with("seg2.ts"));
    }

    #[test]
    fn test_non_playlist_is_returned_unchanged() {
        let doc = "<html>not a playlist</html>";
        assert_eq!(
            try_rewrite(doc, &base(), &route()),
            Err(RewriteError::NotAPlaylist)
        );
        assert_eq!(rewrite(doc, &base(), &route()), doc);
    }

    #[test]
    fn test_manifest_line_classification() {
        let lines: Vec<_> = ManifestLine::parse("#EXTM3U\n\nseg.ts\n").collect();
        assert!(lines[0].is_directive());
        assert!(!lines[1].is_uri_bearing());
        assert!(lines[2].is_uri_bearing());
    }

    #[test]
    fn test_absolute_public_path() {
        let route = ProxyRoute::new("https://relay.example.com/proxy");
        let out = rewrite("#EXTM3U\nseg1.ts\n", &base(), &route);
        assert!(out.contains("https://relay.example.com/proxy?relay=v1&url="));
        assert_eq!(rewrite(&out, &base(), &route), out);
    }
}
