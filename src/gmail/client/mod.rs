
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Gmail caps a single list page at 500, but smaller pages keep memory flat.
const PAGE_SIZE: u32 = 100;

/// A message pulled from the mailbox, before cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedEmail {
    pub gmail_id: String,
    pub sender: String,
    pub subject: String,
    pub received_date: NaiveDateTime,
    /// Raw HTML body when the message has one.
    pub html_body: Option<String>,
    /// Plain-text body, used when no HTML part exists.
    pub text_body: Option<String>,
}

/// Thin client over the Gmail REST API (messages.list + messages.get).
pub struct GmailClient {
    base_url: Url,
    access_token: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    messages: Option<Vec<MessageRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    headers: Option<Vec<Header>>,
    body: Option<PartBody>,
    parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

impl GmailClient {
    #[inline]
    pub fn new(access_token: String) -> Result<Self> {
        let base_url = Url::parse(GMAIL_API_BASE).context("Failed to parse Gmail API base URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            access_token,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    /// Point the client at a different API base. Used by tests.
    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Page through `users.messages.list` for the given query, following
    /// `nextPageToken` until `max_results` ids are collected or the mailbox
    /// runs out of matches.
    #[inline]
    pub fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max_results.saturating_sub(ids.len() as u32);
            if remaining == 0 {
                break;
            }

            let mut url = self
                .base_url
                .join("users/me/messages")
                .context("Failed to build message list URL")?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("q", query);
                pairs.append_pair("maxResults", &remaining.min(PAGE_SIZE).to_string());
                if let Some(token) = &page_token {
                    pairs.append_pair("pageToken", token);
                }
            }

            debug!("Listing messages: {}", url);

            let response_text = self
                .get_with_retry(&url)
                .context("Failed to list messages")?;

            let page: ListResponse = serde_json::from_str(&response_text)
                .context("Failed to parse message list response")?;

            let before = ids.len();
            ids.extend(page.messages.unwrap_or_default().into_iter().map(|m| m.id));

            page_token = page.next_page_token;
            // A token on a page that contributed nothing would loop forever
            if page_token.is_none() || ids.len() == before {
                break;
            }
        }

        debug!("Listed {} message ids for query '{}'", ids.len(), query);
        Ok(ids)
    }

    /// Fetch a single message and extract sender, subject, date, and body.
    #[inline]
    pub fn get_message(&self, id: &str) -> Result<FetchedEmail> {
        let mut url = self
            .base_url
            .join(&format!("users/me/messages/{}", id))
            .context("Failed to build message URL")?;
        url.query_pairs_mut().append_pair("format", "full");

        let response_text = self
            .get_with_retry(&url)
            .with_context(|| format!("Failed to fetch message {}", id))?;

        let message: Message =
            serde_json::from_str(&response_text).context("Failed to parse message response")?;

        Ok(parse_message(message))
    }

    fn get_with_retry(&self, url: &Url) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match self
                .agent
                .get(url.as_str())
                .header("Authorization", &format!("Bearer {}", self.access_token))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
            {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Retryable Gmail API error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(anyhow::anyhow!(
                                    "Gmail API client error: HTTP {}",
                                    status
                                ));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Build the Gmail search query for the configured senders and window,
/// e.g. `from:(a@x.com OR b@y.com) after:2026/08/16`.
#[inline]
pub fn build_query(senders: &[String], window_days: i64) -> String {
    let cutoff = Utc::now() - ChronoDuration::days(window_days);
    let after = cutoff.format("%Y/%m/%d");

    if senders.is_empty() {
        format!("after:{}", after)
    } else {
        format!("from:({}) after:{}", senders.join(" OR "), after)
    }
}

fn parse_message(message: Message) -> FetchedEmail {
    let received_date = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(|| Utc::now().naive_utc(), |dt| dt.naive_utc());

    let (sender, subject) = message
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .map_or_else(
            || (String::new(), String::new()),
            |headers| {
                let find = |name: &str| {
                    headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case(name))
                        .map(|h| h.value.clone())
                        .unwrap_or_default()
                };
                (find("From"), find("Subject"))
            },
        );

    let html_body = message
        .payload
        .as_ref()
        .and_then(|p| find_body_data(p, "text/html"))
        .and_then(|data| decode_body(&data));

    let text_body = message
        .payload
        .as_ref()
        .and_then(|p| find_body_data(p, "text/plain"))
        .and_then(|data| decode_body(&data));

    FetchedEmail {
        gmail_id: message.id,
        sender,
        subject,
        received_date,
        html_body,
        text_body,
    }
}

/// Depth-first search for a part with the wanted MIME type. Newsletters
/// often nest the HTML part inside multipart/alternative inside
/// multipart/mixed, so one level is not enough.
fn find_body_data(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.as_deref() == Some(mime_type) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.clone()) {
            return Some(data);
        }
    }

    part.parts
        .as_ref()?
        .iter()
        .find_map(|child| find_body_data(child, mime_type))
}

fn decode_body(data: &str) -> Option<String> {
    let trimmed = data.trim_end_matches('=');
    match URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!("Failed to decode message body: {}", e);
            None
        }
    }
}
