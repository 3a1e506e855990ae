//! Certificate email delivery
//!
//! Sends the learner a plain-text and a branded HTML body that carry the same
//! content, through the Postmark API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Copy every certificate email to the audit mailbox
pub const ENABLE_CERT_BCC: bool = true;
pub const CERT_BCC_EMAIL: &str = "support@ceumonster.com";

pub const DEFAULT_FROM: &str = "CEU Monster <no-reply@ceumonster.com>";
pub const DEFAULT_POSTMARK_URL: &str = "https://api.postmarkapp.com";
const MESSAGE_STREAM: &str = "outbound";
const LOGO_URL: &str = "https://storage.googleapis.com/public-ceu-monster-assets/logo-dark.png";

/// Delivery failure, carrying the provider's text unchanged
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    Transport(String),
}

/// A certificate-ready email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEmail {
    pub to_email: String,
    pub to_name: String,
    pub signed_url: String,
    pub subject: String,
}

/// Subject line for a certificate email
pub fn subject_for(template_title: Option<&str>) -> String {
    let title = template_title
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or("CEU Certificate");
    format!("{title} — Your Certificate")
}

/// Outbound email channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &CertificateEmail) -> Result<(), NotifyError>;
}

pub fn text_body(email: &CertificateEmail) -> String {
    format!(
        "Hi {name},\n\n\
         Thanks for attending! Your CEU certificate is ready. Download it here:\n{url}\n\n\
         If you didn’t expect this, please ignore this email.\n\n— CEU Monster",
        name = email.to_name,
        url = email.signed_url,
    )
}

pub fn html_body(email: &CertificateEmail) -> String {
    let subject = escape_html(&email.subject);
    let name = escape_html(&email.to_name);
    let url = escape_html(&email.signed_url);

    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width,initial-scale=1" />
    <title>{subject}</title>
    <style>
      .container {{ max-width: 560px; margin: 0 auto; padding: 24px; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif; color: #111827; }}
      .card {{ border: 1px solid #e5e7eb; border-radius: 12px; padding: 24px; }}
      .btn {{ display: inline-block; padding: 12px 18px; text-decoration: none; border-radius: 8px; border: 1px solid #1f2937; }}
      .muted {{ color: #6b7280; font-size: 12px; }}
      .logo {{ height: 32px; }}
      h1 {{ font-size: 20px; margin: 0 0 8px; }}
      p {{ line-height: 1.5; }}
    </style>
  </head>
  <body>
    <div class="container">
      <div style="display:flex;align-items:center;gap:12px;margin-bottom:16px">
        <img class="logo" src="{logo}" alt="CEU Monster" />
        <div style="font-weight:600">CEU Monster</div>
      </div>
      <div class="card">
        <h1>Your CEU Certificate is Ready</h1>
        <p>Hi {name},</p>
        <p>Thanks for attending! Your CEU certificate has been generated. Click below to download your PDF.</p>
        <p style="margin: 18px 0;">
          <a class="btn" href="{url}" target="_blank" rel="noopener noreferrer">Download your certificate (PDF)</a>
        </p>
        <p class="muted">If you didn’t expect this, you can safely ignore this email.</p>
      </div>
      <p class="muted" style="margin-top:16px">
        Sent by CEU Monster · <a href="https://ceumonster.com">ceumonster.com</a>
      </p>
    </div>
  </body>
</html>"#,
        logo = LOGO_URL,
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Postmark `/email` request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkMessage<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<&'a str>,
    subject: &'a str,
    text_body: String,
    html_body: String,
    message_stream: &'a str,
}

/// Postmark response; only a 2xx with `ErrorCode` 0 means accepted
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkResponse {
    error_code: i64,
    #[serde(default)]
    message: String,
}

/// Notifier backed by the Postmark HTTP API
pub struct PostmarkNotifier {
    client: reqwest::Client,
    base_url: String,
    server_token: String,
    from: String,
}

impl PostmarkNotifier {
    pub fn new(server_token: String, base_url: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            server_token,
            from,
        }
    }
}

#[async_trait]
impl Notifier for PostmarkNotifier {
    async fn send(&self, email: &CertificateEmail) -> Result<(), NotifyError> {
        let message = PostmarkMessage {
            from: &self.from,
            to: &email.to_email,
            bcc: ENABLE_CERT_BCC.then_some(CERT_BCC_EMAIL),
            subject: &email.subject,
            text_body: text_body(email),
            html_body: html_body(email),
            message_stream: MESSAGE_STREAM,
        };

        debug!(to = %email.to_email, stream = MESSAGE_STREAM, "Sending certificate email");

        let response = self
            .client
            .post(format!("{}/email", self.base_url))
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", &self.server_token)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        match serde_json::from_str::<PostmarkResponse>(&body) {
            Ok(reply) if status.is_success() && reply.error_code == 0 => {
                info!(to = %email.to_email, "Certificate email accepted by Postmark");
                Ok(())
            }
            Ok(reply) if !reply.message.is_empty() => Err(NotifyError::Provider(reply.message)),
            _ => Err(NotifyError::Provider(format!("HTTP {status}: {body}"))),
        }
    }
}
