use std::env;
use std::time::Duration;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;

use crate::types::Tender;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const DEFAULT_SMTP_PORT: u16 = 587;

/// Chat messages list at most this many document links.
const MAX_LINKS_IN_MESSAGE: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("missing configuration: {0} is not set")]
    MissingConfig(&'static str),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid sender address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Result of one delivery attempt. Failures carry the provider's message
/// instead of erroring out, so one bad send never aborts a batch.
#[derive(Debug, Clone)]
pub struct AlertOutcome {
    pub success: bool,
    pub provider_id: Option<String>,
    pub error: Option<String>,
}

impl AlertOutcome {
    fn sent(provider_id: Option<String>) -> Self {
        AlertOutcome {
            success: true,
            provider_id,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        AlertOutcome {
            success: false,
            provider_id: None,
            error: Some(error),
        }
    }
}

pub(crate) fn ensure_whatsapp_prefix(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

fn require_env(name: &'static str) -> Result<String, NotifyError> {
    env::var(name).map_err(|_| NotifyError::MissingConfig(name))
}

/// WhatsApp channel backed by the Twilio Messages API.
#[derive(Debug, Clone)]
pub struct ChatNotifier {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl ChatNotifier {
    pub fn new(
        account_sid: String,
        auth_token: String,
        from_number: String,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(ChatNotifier {
            client,
            account_sid,
            auth_token,
            from_number: ensure_whatsapp_prefix(&from_number),
        })
    }

    pub fn from_env() -> Result<Self, NotifyError> {
        ChatNotifier::new(
            require_env("TWILIO_ACCOUNT_SID")?,
            require_env("TWILIO_AUTH_TOKEN")?,
            require_env("TWILIO_WHATSAPP_FROM")?,
        )
    }

    pub async fn send_message(&self, to: &str, body: &str) -> AlertOutcome {
        let to = ensure_whatsapp_prefix(to);
        let url = format!(
            "{TWILIO_API_BASE}/Accounts/{}/Messages.json",
            self.account_sid
        );
        let params = [
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", body),
        ];

        let response = match self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AlertOutcome::failed(format!("Twilio request failed: {e}")),
        };

        let status = response.status();
        let payload: Value = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or(Value::Null);

        if status.is_success() {
            let sid = payload
                .get("sid")
                .and_then(Value::as_str)
                .map(str::to_string);
            AlertOutcome::sent(sid)
        } else {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            AlertOutcome::failed(format!("Twilio API error: {message} (HTTP {status})"))
        }
    }

    pub async fn send_tender_alert(&self, to: &str, tender: &Tender) -> AlertOutcome {
        self.send_message(to, &format_chat_alert(tender)).await
    }
}

/// Email channel over SMTP with STARTTLS.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn from_env() -> Result<Self, NotifyError> {
        let sender = require_env("SENDER_EMAIL")?;
        let password = require_env("SENDER_APP_PASSWORD")?;
        let host = require_env("SMTP_HOST")?;
        let port = env::var("SMTP_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)?
            .port(port)
            .credentials(Credentials::new(sender.clone(), password))
            .build();

        Ok(EmailNotifier {
            transport,
            from: sender.parse()?,
        })
    }

    pub async fn send_tender_alert(&self, to: &str, tender: &Tender) -> AlertOutcome {
        let recipient: Mailbox = match to.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => return AlertOutcome::failed(format!("invalid recipient '{to}': {e}")),
        };

        let (subject, body) = format_email_alert(tender);
        let message = match Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .body(body)
        {
            Ok(message) => message,
            Err(e) => return AlertOutcome::failed(format!("could not build email: {e}")),
        };

        match self.transport.send(message).await {
            Ok(response) => AlertOutcome::sent(Some(response.code().to_string())),
            Err(e) => AlertOutcome::failed(format!("SMTP send failed: {e}")),
        }
    }
}

/// WhatsApp-flavored rendering of a tender, fields omitted when empty.
pub fn format_chat_alert(tender: &Tender) -> String {
    let mut parts = vec!["🔔 *New Tender Alert*".to_string()];

    if !tender.title.is_empty() {
        parts.push(format!("\n*Title:* {}", tender.title));
    }
    if !tender.number.is_empty() {
        parts.push(format!("*Tender No:* {}", tender.number));
    }
    if !tender.category.is_empty() {
        parts.push(format!("*Category:* {}", tender.category));
    }
    if !tender.department_owner.is_empty() {
        parts.push(format!("*Department:* {}", tender.department_owner));
    }
    if !tender.closing_date.is_empty() {
        parts.push(format!("*Closing Date:* {}", tender.closing_date));
    }
    if !tender.document_links.is_empty() {
        parts.push(format!(
            "\n*Documents:* {} available",
            tender.document_links.len()
        ));
        for (i, link) in tender
            .document_links
            .iter()
            .take(MAX_LINKS_IN_MESSAGE)
            .enumerate()
        {
            parts.push(format!("{}. {link}", i + 1));
        }
    }

    parts.join("\n")
}

/// Subject and plain-text body for the email channel.
pub fn format_email_alert(tender: &Tender) -> (String, String) {
    let subject = if tender.number.is_empty() {
        format!("New Tender: {}", tender.title)
    } else {
        format!("New Tender {}: {}", tender.number, tender.title)
    };

    let mut body = format!("A new tender has been published.\n\nTitle: {}\n", tender.title);
    if !tender.number.is_empty() {
        body.push_str(&format!("Tender No: {}\n", tender.number));
    }
    if !tender.category.is_empty() {
        body.push_str(&format!("Category: {}\n", tender.category));
    }
    if !tender.department_owner.is_empty() {
        body.push_str(&format!("Department: {}\n", tender.department_owner));
    }
    if !tender.start_date.is_empty() {
        body.push_str(&format!("Advertised: {}\n", tender.start_date));
    }
    if !tender.closing_date.is_empty() {
        body.push_str(&format!("Closing Date: {}\n", tender.closing_date));
    }
    if !tender.document_links.is_empty() {
        body.push_str("\nDocuments:\n");
        for link in &tender.document_links {
            body.push_str(&format!("  {link}\n"));
        }
    }

    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tender() -> Tender {
        Tender {
            title: "Supply of Laptops".to_string(),
            category: "IT Equipment".to_string(),
            department_owner: "Ministry of Education".to_string(),
            start_date: "01-02-2024".to_string(),
            closing_date: "15-02-2024".to_string(),
            number: "TSE-2024-001".to_string(),
            tse: "2024".to_string(),
            document_links: (1..=5)
                .map(|i| format!("https://ppra.gov.pk/doc/{i}.pdf"))
                .collect(),
        }
    }

    #[test]
    fn test_ensure_whatsapp_prefix() {
        assert_eq!(ensure_whatsapp_prefix("+923001234567"), "whatsapp:+923001234567");
        assert_eq!(
            ensure_whatsapp_prefix("whatsapp:+923001234567"),
            "whatsapp:+923001234567"
        );
    }

    #[test]
    fn test_chat_alert_lists_at_most_three_links() {
        let message = format_chat_alert(&sample_tender());

        assert!(message.contains("*Title:* Supply of Laptops"));
        assert!(message.contains("*Tender No:* TSE-2024-001"));
        assert!(message.contains("*Documents:* 5 available"));
        assert!(message.contains("3. https://ppra.gov.pk/doc/3.pdf"));
        assert!(!message.contains("doc/4.pdf"));
    }

    #[test]
    fn test_chat_alert_omits_empty_fields() {
        let tender = Tender {
            title: "Bare Minimum".to_string(),
            ..Tender::default()
        };
        let message = format_chat_alert(&tender);

        assert!(message.contains("Bare Minimum"));
        assert!(!message.contains("*Category:*"));
        assert!(!message.contains("*Closing Date:*"));
        assert!(!message.contains("*Documents:*"));
    }

    #[test]
    fn test_email_alert_subject_and_body() {
        let (subject, body) = format_email_alert(&sample_tender());

        assert_eq!(subject, "New Tender TSE-2024-001: Supply of Laptops");
        assert!(body.contains("Closing Date: 15-02-2024"));
        assert!(body.contains("https://ppra.gov.pk/doc/5.pdf"));
    }

    #[test]
    fn test_email_alert_subject_without_number() {
        let tender = Tender {
            title: "Unnumbered".to_string(),
            ..Tender::default()
        };
        let (subject, _) = format_email_alert(&tender);
        assert_eq!(subject, "New Tender: Unnumbered");
    }
}
