use sha2::{Digest, Sha256};
use url::Url;

const TRACKING_PARAM_PREFIXES: &[&str] = &["utm_"];
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid"];

/// Canonicalize a URL per spec §3: lowercase scheme and host, strip default ports,
/// strip a trailing slash from the path (except root), strip the fragment, and drop
/// tracking query parameters. Idempotent: `canonicalize(canonicalize(u)) ==
/// canonicalize(u)` for all `u` (spec §8 invariant 4).
///
/// Falls back to a lowercased, trimmed copy of the input if it doesn't parse as a
/// URL at all, so callers never have to branch on parse failure here.
pub fn canonicalize(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.trim().to_lowercase();
    };

    let _ = url.set_scheme(&url.scheme().to_lowercase());
    if let Some(host) = url.host_str() {
        let host = host.to_lowercase();
        let _ = url.set_host(Some(&host));
    }

    let default_port = match url.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if url.port() == default_port {
        let _ = url.set_port(None);
    }

    url.set_fragment(None);

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.as_ref();
            !TRACKING_PARAM_PREFIXES.iter().any(|p| k.starts_with(p))
                && !TRACKING_PARAMS.contains(&k)
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&retained);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

/// `hex(stable_hash(source_name || "\x1f" || canonicalize(url)))` per spec §3. Does
/// NOT incorporate title, so title edits upstream never create duplicate records.
pub fn fingerprint(source_name: &str, url: &str) -> String {
    let input = format!("{source_name}\u{1f}{}", canonicalize(url));
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_default_ports() {
        assert_eq!(canonicalize("https://Example.com:443/a"), "https://example.com/a");
        assert_eq!(canonicalize("http://example.com:80/a"), "http://example.com/a");
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(canonicalize("https://example.com/a/"), "https://example.com/a");
        assert_eq!(canonicalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn strips_fragment() {
        assert_eq!(canonicalize("https://example.com/a#section"), "https://example.com/a");
    }

    #[test]
    fn drops_tracking_params_but_keeps_others() {
        let got = canonicalize("https://example.com/a?utm_source=foo&gclid=x&id=7");
        assert_eq!(got, "https://example.com/a?id=7");
    }

    #[test]
    fn drops_query_entirely_when_only_tracking_params() {
        assert_eq!(
            canonicalize("https://example.com/a?utm_source=foo&fbclid=y"),
            "https://example.com/a"
        );
    }

    #[test]
    fn is_idempotent() {
        let once = canonicalize("HTTPS://Example.COM:443/a/b/?utm_campaign=x#y");
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn fingerprint_ignores_tracking_params_and_title() {
        let a = fingerprint("example", "https://x.test/b");
        let b = fingerprint("example", "https://x.test/b?utm_source=foo");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_by_source() {
        let a = fingerprint("example", "https://x.test/a");
        let b = fingerprint("other", "https://x.test/a");
        assert_ne!(a, b);
    }
}
