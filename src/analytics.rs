//! Fire-and-forget analytics dispatch. Events are best-effort: failures are
//! logged and never surface to the request that triggered them.

use serde_json::json;

#[derive(Clone)]
pub struct Analytics {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Analytics {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Emit a try-created event. Dispatch happens on a spawned task so the
    /// create request never waits on the sink.
    pub fn try_created(&self, case_id: i64, try_number: i64, search_engine: &str) {
        let payload = json!({
            "event": "try_created",
            "case_id": case_id,
            "try_number": try_number,
            "search_engine": search_engine,
        });

        let Some(url) = self.webhook_url.clone() else {
            tracing::debug!("Analytics webhook not configured, dropping event: {}", payload);
            return;
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                tracing::warn!("Failed to dispatch analytics event: {}", e);
            }
        });
    }
}
