//! Webhook notifications for new request rows

use crate::audit::{AuditSink, timestamp_now};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::reader::{CellValue, Workbook};
use crate::sync::headers::find_column;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// JSON body posted to the webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Value>>,
}

/// Sends a payload; any non-2xx status or transport error is a failure
pub trait WebhookPoster {
    fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), SyncError>;
}

/// Blocking HTTP implementation of [`WebhookPoster`]; one client serves every request
#[derive(Debug, Clone)]
pub struct HttpPoster {
    #[cfg(feature = "webhook")]
    client: reqwest::blocking::Client,
}

impl HttpPoster {
    #[cfg(feature = "webhook")]
    pub fn new(timeout_secs: u64) -> Result<Self, SyncError> {
        use std::time::Duration;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::ExternalCallFailure(e.to_string()))?;
        Ok(Self { client })
    }

    #[cfg(not(feature = "webhook"))]
    pub fn new(_timeout_secs: u64) -> Result<Self, SyncError> {
        Ok(Self {})
    }
}

#[cfg(feature = "webhook")]
impl WebhookPoster for HttpPoster {
    fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), SyncError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .map_err(|e| SyncError::ExternalCallFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::ExternalCallFailure(format!(
                "webhook responded with status {}",
                status
            )))
        }
    }
}

#[cfg(not(feature = "webhook"))]
impl WebhookPoster for HttpPoster {
    fn post(&self, _url: &str, _payload: &WebhookPayload) -> Result<(), SyncError> {
        Err(SyncError::ExternalCallFailure(
            "built without webhook support".to_string(),
        ))
    }
}

/// Logs the payload instead of sending it
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPoster;

impl WebhookPoster for DryRunPoster {
    fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), SyncError> {
        info!(url, text = %payload.text, "dry run, webhook not called");
        Ok(())
    }
}

/// Outcome of a notify run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    /// Set when the webhook URL is not configured and nothing was attempted
    pub skipped: bool,
    pub sent: usize,
    pub failed: usize,
    /// Rows stamped as notified
    pub notified_rows: Vec<u32>,
}

/// Post one message per pending request row and stamp the rows that succeed.
///
/// A row is pending when its notified cell is blank and any other cell has
/// content. Without a webhook URL this returns immediately with no changes.
pub fn notify_pending(
    workbook: &mut Workbook,
    config: &SyncConfig,
    poster: &dyn WebhookPoster,
    audit: &mut dyn AuditSink,
) -> Result<NotifyReport, SyncError> {
    let Some(url) = config.webhook_url() else {
        debug!("webhook url not configured, skipping notifications");
        return Ok(NotifyReport {
            skipped: true,
            ..NotifyReport::default()
        });
    };

    let settings = &config.notify;
    let table = workbook
        .get_table_mut(&settings.sheet)
        .ok_or_else(|| SyncError::MissingDestinationSheet(settings.sheet.clone()))?;

    let header = table.header_row();
    let notified_col = find_column(&header, &settings.notified_column).ok_or_else(|| {
        SyncError::MissingRequiredHeader {
            table: settings.sheet.clone(),
            columns: vec![settings.notified_column.clone()],
        }
    })?;

    // Missing summary columns are left out of the message
    let summary: Vec<(String, u32)> = settings
        .summary_columns
        .iter()
        .filter_map(|name| find_column(&header, name).map(|col| (name.clone(), col)))
        .collect();

    let mut report = NotifyReport::default();
    for row in 2..=table.last_row() {
        if !table.display(row, notified_col).trim().is_empty() {
            continue;
        }
        let has_content = (1..=table.last_column())
            .filter(|col| *col != notified_col)
            .any(|col| !table.display(row, col).trim().is_empty());
        if !has_content {
            continue;
        }

        let fields: Vec<(String, String)> = summary
            .iter()
            .map(|(name, col)| (name.clone(), table.display(row, *col).trim().to_string()))
            .collect();
        let payload = build_payload(&settings.title, &fields);

        match poster.post(url, &payload) {
            Ok(()) => {
                table.set(row, notified_col, CellValue::Text(timestamp_now()));
                report.sent += 1;
                report.notified_rows.push(row);
                info!(sheet = %settings.sheet, row, "request notified");
            }
            Err(e) => {
                report.failed += 1;
                warn!(sheet = %settings.sheet, row, error = %e, "notification failed");
                audit.record("notify", &format!("row {}: {}", row, e));
            }
        }
    }

    Ok(report)
}

/// Build the `{ text, blocks }` message for one request
pub fn build_payload(title: &str, fields: &[(String, String)]) -> WebhookPayload {
    let mut text = title.to_string();
    for (name, value) in fields {
        text.push_str(&format!("\n{}: {}", name, value));
    }

    let mut blocks = vec![json!({
        "type": "header",
        "text": { "type": "plain_text", "text": title },
    })];
    if !fields.is_empty() {
        let items: Vec<Value> = fields
            .iter()
            .map(|(name, value)| {
                json!({ "type": "mrkdwn", "text": format!("*{}*\n{}", name, value) })
            })
            .collect();
        blocks.push(json!({ "type": "section", "fields": items }));
    }

    WebhookPayload {
        text,
        blocks: Some(blocks),
    }
}
