//! The resilient fetch layer shared by every adapter (spec §4.C). One free
//! function parameterized by the HTTP client, per the "mixed fetch-then-parse
//! inheritance" re-architecture note: no base-class fetcher, just composition.

use std::io::Read;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use blogwatch_core::error::{CoreError, CoreResult};
use blogwatch_core::security::UrlValidator;

const RATE_LIMIT_BASE: Duration = Duration::from_secs(1);
const RATE_LIMIT_MAX_ATTEMPTS: u32 = 5;
const RATE_LIMIT_MAX_TOTAL: Duration = Duration::from_secs(30);
const SERVER_ERROR_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a resilient fetch, used by adapters that need to distinguish a
/// bot challenge from an ordinary failure (e.g. to decide on browser fallback).
pub enum FetchOutcome {
    Body(Vec<u8>),
    BotChallenged,
}

/// Performs one resilient HTTP GET against `url`, following the status-code
/// policy in spec §4.C. Hosts in `bot_gated` get the `BotChallenged` outcome on
/// 403/503 instead of an error, so the caller can fall through to a browser.
pub async fn fetch(
    client: &reqwest::Client,
    validator: &UrlValidator,
    url: &str,
    bot_gated: bool,
) -> CoreResult<FetchOutcome> {
    validator.validate_with_dns(url).await?;

    let mut accept = DEFAULT_ACCEPT;
    let mut total_backoff = Duration::ZERO;

    for attempt in 0..RATE_LIMIT_MAX_ATTEMPTS.max(SERVER_ERROR_MAX_ATTEMPTS) {
        let response = client
            .get(url)
            .header("User-Agent", DESKTOP_USER_AGENT)
            .header("Accept", accept)
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Accept-Encoding", "gzip, deflate, br, zstd")
            .header("DNT", "1")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Connection", "keep-alive")
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            let content_encoding = response
                .headers()
                .get(reqwest::header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response
                .bytes()
                .await
                .map_err(|e| CoreError::Network(e.to_string()))?;
            return Ok(FetchOutcome::Body(decompress_if_needed(&bytes, content_encoding.as_deref())));
        }

        if status == StatusCode::NOT_ACCEPTABLE && accept != "*/*" {
            info!(url, "406 response, retrying with generic Accept header");
            accept = "*/*";
            continue;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            if rate_limit_exhausted(attempt, total_backoff) {
                return Err(CoreError::RateLimited(format!("{url} rate limited after {attempt} attempts")));
            }
            let retry_after = parse_retry_after(response.headers().get("retry-after").and_then(|v| v.to_str().ok()));
            let wait = rate_limit_wait(attempt, retry_after, total_backoff);
            warn!(url, attempt, wait_ms = wait.as_millis() as u64, "429, backing off");
            total_backoff += wait;
            tokio::time::sleep(wait).await;
            continue;
        }

        if is_bot_challenge(status, bot_gated) {
            warn!(url, %status, "bot-gated host returned challenge status");
            return Ok(FetchOutcome::BotChallenged);
        }

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            if attempt + 1 >= SERVER_ERROR_MAX_ATTEMPTS {
                return Err(CoreError::Network(format!("{url} returned {status} after retries")));
            }
            let wait = server_error_backoff(attempt) + jitter();
            warn!(url, attempt, %status, "5xx, retrying");
            tokio::time::sleep(wait).await;
            continue;
        }

        return Err(CoreError::Network(format!("{url} returned permanent failure status {status}")));
    }

    Err(CoreError::Network(format!("{url} exhausted retry attempts")))
}

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";
const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Parses a `Retry-After` header value (seconds form only; the corpus never
/// sees the HTTP-date form from these feed hosts).
fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    header_value.and_then(|v| v.parse::<u64>().ok()).map(Duration::from_secs)
}

/// True once a 429 has been retried enough times or waited long enough that
/// spending more time on this source isn't worth it (spec S3).
fn rate_limit_exhausted(attempt: u32, total_backoff: Duration) -> bool {
    attempt + 1 >= RATE_LIMIT_MAX_ATTEMPTS || total_backoff >= RATE_LIMIT_MAX_TOTAL
}

/// How long to wait before the next attempt on a 429: the server's own
/// `Retry-After` if it gave one, otherwise exponential backoff, always capped
/// so a single source can't blow through the total backoff budget.
fn rate_limit_wait(attempt: u32, retry_after: Option<Duration>, total_backoff: Duration) -> Duration {
    let wait = retry_after.unwrap_or_else(|| RATE_LIMIT_BASE * 2u32.pow(attempt));
    wait.min(RATE_LIMIT_MAX_TOTAL - total_backoff)
}

/// A bot-gated host returning 403/503 means "prove you're a browser," not
/// "this page doesn't exist" — the caller falls through to a browser fetch
/// instead of treating it as a hard failure (spec S4).
fn is_bot_challenge(status: StatusCode, bot_gated: bool) -> bool {
    bot_gated && (status == StatusCode::FORBIDDEN || status == StatusCode::SERVICE_UNAVAILABLE)
}

fn server_error_backoff(attempt: u32) -> Duration {
    RATE_LIMIT_BASE * 2u32.pow(attempt)
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..500))
}

/// `reqwest` auto-decompresses gzip/deflate/br/zstd and strips the
/// `Content-Encoding` header once it does. If the header is still present on
/// the response by the time we read it here, the client didn't unwrap the
/// body (seen in practice behind proxies that re-wrap an already-forwarded
/// response). Decode explicitly in that case rather than handing callers
/// compressed bytes disguised as HTML.
fn decompress_if_needed(bytes: &[u8], content_encoding: Option<&str>) -> Vec<u8> {
    let Some(encoding) = content_encoding else {
        return bytes.to_vec();
    };

    let decoded = match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => decode_gzip(bytes),
        "deflate" => decode_deflate(bytes),
        "br" => decode_brotli(bytes),
        "zstd" => decode_zstd(bytes),
        _ => None,
    };

    match decoded {
        Some(d) => d,
        None => {
            debug!(encoding, "content-encoding present but not decodable, passing bytes through as-is");
            bytes.to_vec()
        }
    }
}

fn decode_gzip(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(bytes).read_to_end(&mut out).ok()?;
    Some(out)
}

fn decode_deflate(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::DeflateDecoder::new(bytes).read_to_end(&mut out).ok()?;
    Some(out)
}

fn decode_brotli(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    brotli::Decompressor::new(bytes, 4096).read_to_end(&mut out).ok()?;
    Some(out)
}

fn decode_zstd(bytes: &[u8]) -> Option<Vec<u8>> {
    zstd::stream::decode_all(bytes).ok()
}
