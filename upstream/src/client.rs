//! HTTP client for the external verification service.
//!
//! The service authorizes calls with a CSRF token plus whatever cookies its
//! handshake endpoints hand out. Neither is documented, so acquisition is a
//! fallback chain over unauthenticated requests, trying at each step: the
//! `x-csrf-token` response header, a cookie whose name looks CSRF-ish, and
//! token patterns embedded in the body. The resulting session is cached for
//! the life of the process and invalidated on any failed authorized call —
//! the next call simply re-handshakes.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, ACCEPT, COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT};
use tokio::sync::Mutex;
use tracing::debug;

use crate::payload::UpstreamPayload;
use crate::sse::{SseEvent, SseParser};
use crate::UpstreamError;

const CSRF_HEADER: &str = "x-csrf-token";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A lazily decoded sequence of SSE frames from one batch submission.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, UpstreamError>> + Send>>;

/// Token + merged cookie jar authorizing calls to the service.
#[derive(Clone, Debug)]
pub struct CsrfSession {
    pub token: String,
    pub cookie: String,
}

/// The seam the job orchestrator consumes. Tests implement this with
/// scripted frames instead of a network.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Submit a batch of verification ids; the response is an SSE stream.
    async fn submit_batch(
        &self,
        ids: &[String],
        secret: &str,
    ) -> Result<EventStream, UpstreamError>;

    /// Poll the status of a verification under review.
    async fn poll_status(&self, check_token: &str) -> Result<UpstreamPayload, UpstreamError>;
}

/// Client for the external verification service.
pub struct UpstreamClient {
    base_url: String,
    program_id: String,
    http: reqwest::Client,
    request_timeout: Duration,
    session: Mutex<Option<CsrfSession>>,
}

impl UpstreamClient {
    pub fn new(base_url: &str, program_id: &str, request_timeout_ms: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            program_id: program_id.to_string(),
            http: reqwest::Client::new(),
            request_timeout: Duration::from_millis(request_timeout_ms),
            session: Mutex::new(None),
        }
    }

    /// Return the cached session, performing the handshake chain if there
    /// is none. Holding the lock across the handshake also serializes
    /// concurrent acquisitions into a single upstream round trip.
    async fn acquire_session(&self) -> Result<CsrfSession, UpstreamError> {
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }
        let session = self.handshake().await?;
        *cached = Some(session.clone());
        Ok(session)
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    /// The fallback chain: primary page, then the dedicated CSRF endpoint.
    /// A failed step yields nothing and the chain moves on; only an empty
    /// chain is an error.
    async fn handshake(&self) -> Result<CsrfSession, UpstreamError> {
        let mut jar = CookieJar::default();

        let page_url = format!("{}/", self.base_url);
        if let Some(token) = self.try_handshake_step(&page_url, false, &mut jar).await {
            return Ok(CsrfSession {
                token,
                cookie: jar.header_value(),
            });
        }

        let api_url = format!("{}/api/csrf", self.base_url);
        if let Some(token) = self.try_handshake_step(&api_url, true, &mut jar).await {
            return Ok(CsrfSession {
                token,
                cookie: jar.header_value(),
            });
        }

        Err(UpstreamError::NoCsrfToken)
    }

    /// One step of the chain. `parse_json` additionally tries the
    /// `csrfToken`/`token` fields of a JSON body (the CSRF endpoint's
    /// native shape).
    async fn try_handshake_step(
        &self,
        url: &str,
        parse_json: bool,
        jar: &mut CookieJar,
    ) -> Option<String> {
        let result = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .header(ACCEPT, "text/html,application/json,*/*")
            .header(USER_AGENT, BROWSER_UA)
            .header(REFERER, format!("{}/", self.base_url))
            .send()
            .await;
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url, error = %e, "CSRF handshake step failed");
                return None;
            }
        };

        jar.absorb(resp.headers());

        if let Some(token) = header_token(resp.headers()) {
            return Some(token);
        }
        if let Some(token) = jar.csrf_named_cookie() {
            return Some(token);
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(url, error = %e, "CSRF handshake body read failed");
                return None;
            }
        };
        if parse_json {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                for field in ["csrfToken", "token"] {
                    if let Some(token) = json.get(field).and_then(|v| v.as_str()) {
                        if !token.is_empty() {
                            return Some(token.to_string());
                        }
                    }
                }
            }
        }
        extract_token_from_html(&body)
    }
}

#[async_trait]
impl UpstreamApi for UpstreamClient {
    async fn submit_batch(
        &self,
        ids: &[String],
        secret: &str,
    ) -> Result<EventStream, UpstreamError> {
        if secret.is_empty() {
            return Err(UpstreamError::MissingSecret);
        }
        let session = self.acquire_session().await?;

        let mut request = self
            .http
            .post(format!("{}/api/batch", self.base_url))
            .timeout(self.request_timeout)
            .header(ACCEPT, "text/event-stream")
            .header(CSRF_HEADER, session.token.as_str())
            .header(ORIGIN, self.base_url.as_str())
            .header(REFERER, format!("{}/", self.base_url))
            .json(&serde_json::json!({
                "verificationIds": ids,
                "hCaptchaToken": secret,
                "programId": self.program_id,
            }));
        if !session.cookie.is_empty() {
            request = request.header(COOKIE, session.cookie.as_str());
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.invalidate_session().await;
                return Err(UpstreamError::Transport(e.to_string()));
            }
        };
        if !resp.status().is_success() {
            self.invalidate_session().await;
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Http { status, body });
        }
        if resp.content_length() == Some(0) {
            return Err(UpstreamError::EmptyBody);
        }

        let chunks = resp
            .bytes_stream()
            .map(|r| r.map(|b| b.to_vec()).map_err(|e| UpstreamError::Transport(e.to_string())));
        Ok(sse_stream(chunks))
    }

    async fn poll_status(&self, check_token: &str) -> Result<UpstreamPayload, UpstreamError> {
        let session = self.acquire_session().await?;

        let mut request = self
            .http
            .post(format!("{}/api/check-status", self.base_url))
            .timeout(self.request_timeout)
            .header(ACCEPT, "application/json")
            .header(CSRF_HEADER, session.token.as_str())
            .header(ORIGIN, self.base_url.as_str())
            .header(REFERER, format!("{}/", self.base_url))
            .json(&serde_json::json!({ "checkToken": check_token }));
        if !session.cookie.is_empty() {
            request = request.header(COOKIE, session.cookie.as_str());
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.invalidate_session().await;
                return Err(UpstreamError::Transport(e.to_string()));
            }
        };
        if !resp.status().is_success() {
            // The payload still flows back error-shaped; only the session
            // is refreshed for the next attempt.
            self.invalidate_session().await;
        }
        let text = resp
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(UpstreamPayload::from_poll_body(&text))
    }
}

/// Adapt a chunk stream into a lazy frame stream through [`SseParser`].
/// Chunk-level errors surface in-band; the stream ends after the parser's
/// end-of-input flush.
fn sse_stream<S>(chunks: S) -> EventStream
where
    S: Stream<Item = Result<Vec<u8>, UpstreamError>> + Send + 'static,
{
    struct State<S> {
        chunks: Pin<Box<S>>,
        parser: SseParser,
        ready: VecDeque<SseEvent>,
        done: bool,
    }
    let state = State {
        chunks: Box::pin(chunks),
        parser: SseParser::new(),
        ready: VecDeque::new(),
        done: false,
    };
    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.ready.pop_front() {
                return Some((Ok(event), st));
            }
            if st.done {
                return None;
            }
            match st.chunks.next().await {
                Some(Ok(chunk)) => {
                    st.ready.extend(st.parser.feed(&chunk));
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.done = true;
                    st.ready.extend(st.parser.finish());
                }
            }
        }
    }))
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Cookie jar merging `Set-Cookie` values across the handshake chain,
/// last-value-wins per cookie name.
#[derive(Default)]
struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    fn absorb(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(text) = value.to_str() else { continue };
            let Some(pair) = text.split(';').next() else { continue };
            let Some((name, val)) = pair.split_once('=') else { continue };
            let (name, val) = (name.trim(), val.trim());
            if name.is_empty() {
                continue;
            }
            self.insert(name, val);
        }
    }

    fn insert(&mut self, name: &str, val: &str) {
        if let Some(entry) = self.cookies.iter_mut().find(|(n, _)| n == name) {
            entry.1 = val.to_string();
        } else {
            self.cookies.push((name.to_string(), val.to_string()));
        }
    }

    /// The value of a cookie whose name looks like a CSRF token carrier.
    fn csrf_named_cookie(&self) -> Option<String> {
        self.cookies
            .iter()
            .find(|(name, value)| {
                let lower = name.to_ascii_lowercase();
                (lower.contains("csrf") || lower.contains("xsrf")) && !value.is_empty()
            })
            .map(|(_, value)| value.clone())
    }

    fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Extract an embedded CSRF token from an HTML body: the `csrf-token`
/// meta tag (either attribute order), then inline assignments like
/// `CSRF_TOKEN = "..."` / `csrfToken: "..."`.
fn extract_token_from_html(html: &str) -> Option<String> {
    if let Some(token) = meta_content_token(html) {
        return Some(token);
    }
    ["csrf_token", "csrftoken", "csrf-token"]
        .iter()
        .find_map(|anchor| inline_token_after(html, anchor))
}

/// `content` attribute of any tag mentioning `csrf-token`.
fn meta_content_token(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(rel) = lower[from..].find("csrf-token") {
        let pos = from + rel;
        if let Some(tag_start) = lower[..pos].rfind('<') {
            if let Some(end_rel) = lower[pos..].find('>') {
                let tag_end = pos + end_rel;
                if let Some(value) =
                    attr_value(&html[tag_start..tag_end], &lower[tag_start..tag_end], "content")
                {
                    if !value.is_empty() {
                        return Some(value);
                    }
                }
            }
        }
        from = pos + "csrf-token".len();
    }
    None
}

/// Quoted value of `attr` within a single tag. `orig` and `lower` are the
/// same slice in original and ASCII-lowercased form (byte-identical
/// offsets).
fn attr_value(orig: &str, lower: &str, attr: &str) -> Option<String> {
    let mut from = 0;
    while let Some(rel) = lower[from..].find(attr) {
        let after = from + rel + attr.len();
        let rest = orig[after..].trim_start();
        if let Some(eq_rest) = rest.strip_prefix('=') {
            let eq_rest = eq_rest.trim_start();
            let mut chars = eq_rest.chars();
            if let Some(quote @ ('"' | '\'')) = chars.next() {
                let body = &eq_rest[1..];
                if let Some(end) = body.find(quote) {
                    return Some(body[..end].to_string());
                }
            }
        }
        from = after;
    }
    None
}

/// First plausible quoted token following an inline `anchor` assignment:
/// the anchor, a short separator run (closing quote, whitespace, `:`/`=`)
/// ending in an opening quote, then the value.
fn inline_token_after(html: &str, anchor: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(rel) = lower[from..].find(anchor) {
        let after = from + rel + anchor.len();
        if let Some(token) = capture_quoted(&html[after..]) {
            return Some(token);
        }
        from = after;
    }
    None
}

fn capture_quoted(rest: &str) -> Option<String> {
    const SEPARATORS: &[char] = &[' ', '\t', ':', '=', '"', '\''];
    let sep_len = rest
        .find(|c: char| !SEPARATORS.contains(&c))
        .unwrap_or(rest.len());
    if sep_len == 0 || sep_len > 8 {
        return None;
    }
    let opening = rest[..sep_len].chars().last()?;
    if opening != '"' && opening != '\'' {
        return None;
    }
    let body = &rest[sep_len..];
    let end = body.find(opening)?;
    let value = &body[..end];
    let plausible = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_+/=.".contains(c));
    plausible.then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    // ── Token extraction ────────────────────────────────────────────────

    #[test]
    fn meta_tag_both_attribute_orders() {
        let a = r#"<head><meta name="csrf-token" content="tok-aaa111"></head>"#;
        let b = r#"<head><meta content="tok-bbb222" name="csrf-token"></head>"#;
        assert_eq!(extract_token_from_html(a).as_deref(), Some("tok-aaa111"));
        assert_eq!(extract_token_from_html(b).as_deref(), Some("tok-bbb222"));
    }

    #[test]
    fn inline_assignment_variants() {
        for html in [
            r#"<script>window.CSRF_TOKEN = "abc123";</script>"#,
            r#"<script>var csrfToken = 'abc123';</script>"#,
            r#"<script>config = {"csrfToken": "abc123"}</script>"#,
        ] {
            assert_eq!(
                extract_token_from_html(html).as_deref(),
                Some("abc123"),
                "failed on: {html}"
            );
        }
    }

    #[test]
    fn meta_tag_wins_over_inline() {
        let html = r#"<meta name="csrf-token" content="from-meta">
                      <script>CSRF_TOKEN = "from-inline"</script>"#;
        assert_eq!(extract_token_from_html(html).as_deref(), Some("from-meta"));
    }

    #[test]
    fn no_token_in_unrelated_html() {
        let html = r#"<html><body><div class="hero">Welcome</div></body></html>"#;
        assert!(extract_token_from_html(html).is_none());
    }

    #[test]
    fn css_class_mention_is_not_a_token() {
        let html = r#"<div class="csrf-token">label</div>"#;
        assert!(extract_token_from_html(html).is_none());
    }

    // ── Cookie jar ──────────────────────────────────────────────────────

    fn headers_with_cookies(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for v in values {
            headers.append(SET_COOKIE, v.parse().unwrap());
        }
        headers
    }

    #[test]
    fn jar_merges_last_value_wins() {
        let mut jar = CookieJar::default();
        jar.absorb(&headers_with_cookies(&[
            "sid=one; Path=/; HttpOnly",
            "theme=dark",
        ]));
        jar.absorb(&headers_with_cookies(&["sid=two; Path=/"]));
        assert_eq!(jar.header_value(), "sid=two; theme=dark");
    }

    #[test]
    fn jar_finds_csrf_named_cookie() {
        let mut jar = CookieJar::default();
        jar.absorb(&headers_with_cookies(&[
            "session=s1",
            "XSRF-TOKEN=cookie-tok; Path=/",
        ]));
        assert_eq!(jar.csrf_named_cookie().as_deref(), Some("cookie-tok"));
    }

    #[test]
    fn jar_ignores_malformed_set_cookie() {
        let mut jar = CookieJar::default();
        jar.absorb(&headers_with_cookies(&["no-equals-sign", "=orphan"]));
        assert_eq!(jar.header_value(), "");
        assert!(jar.csrf_named_cookie().is_none());
    }

    // ── Stream adapter ──────────────────────────────────────────────────

    #[tokio::test]
    async fn chunk_stream_becomes_frame_stream() {
        let chunks = stream::iter(vec![
            Ok(b"event: processing\nda".to_vec()),
            Ok(b"ta: {}\n\nevent: result\n".to_vec()),
            Ok(b"data: {\"status\":\"SUCCESS\"}\n\n".to_vec()),
        ]);
        let mut frames = sse_stream(chunks);
        let mut seen = Vec::new();
        while let Some(item) = frames.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event, "processing");
        assert_eq!(seen[1].data, "{\"status\":\"SUCCESS\"}");
    }

    #[tokio::test]
    async fn unterminated_final_frame_flushes_at_eof() {
        let chunks = stream::iter(vec![Ok(b"event: result\ndata: tail\n".to_vec())]);
        let mut frames = sse_stream(chunks);
        let only = frames.next().await.unwrap().unwrap();
        assert_eq!((only.event.as_str(), only.data.as_str()), ("result", "tail"));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn chunk_error_surfaces_in_band_then_ends() {
        let chunks = stream::iter(vec![
            Ok(b"event: processing\ndata: {}\n\n".to_vec()),
            Err(UpstreamError::Transport("connection reset".into())),
        ]);
        let mut frames = sse_stream(chunks);
        assert!(frames.next().await.unwrap().is_ok());
        assert!(frames.next().await.unwrap().is_err());
        assert!(frames.next().await.is_none());
    }
}
