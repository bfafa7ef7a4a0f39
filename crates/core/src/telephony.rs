//! Outbound Call Placement
//!
//! Placing a call happens before any media stream exists: the provider dials
//! the number and then fetches the call-control document from `twiml_url`,
//! which in turn points the media stream back at the bridge.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Parameters for one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub to: String,
    pub twiml_url: String,
    pub recording_status_callback: Option<String>,
}

/// A telephony provider able to start outbound calls.
#[async_trait]
pub trait CallPlacer: Send + Sync {
    /// Starts the call and returns the provider's call id.
    async fn place_call(&self, call: &OutboundCall) -> Result<String>;
}

#[derive(Deserialize)]
struct CreatedCall {
    sid: String,
}

#[derive(Deserialize)]
struct TwilioErrorBody {
    message: String,
}

/// `CallPlacer` backed by the Twilio REST API.
pub struct TwilioCallPlacer {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

impl TwilioCallPlacer {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid,
            auth_token,
            from_number,
            api_base: TWILIO_API_BASE.to_string(),
        }
    }

    /// Overrides the API base URL, e.g. to point at a local stub.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }

    fn form_params(&self, call: &OutboundCall) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("To", call.to.clone()),
            ("From", self.from_number.clone()),
            ("Url", call.twiml_url.clone()),
            ("Record", "true".to_string()),
        ];
        if let Some(callback) = &call.recording_status_callback {
            params.push(("RecordingStatusCallback", callback.clone()));
            params.push(("RecordingStatusCallbackMethod", "POST".to_string()));
        }
        params
    }
}

#[async_trait]
impl CallPlacer for TwilioCallPlacer {
    async fn place_call(&self, call: &OutboundCall) -> Result<String> {
        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&self.form_params(call))
            .send()
            .await
            .context("Failed to reach the Twilio API")?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<TwilioErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(anyhow!("Twilio rejected the call ({}): {}", status, message));
        }

        let created: CreatedCall = response
            .json()
            .await
            .context("Unexpected response body from Twilio")?;
        tracing::debug!(call_sid = %created.sid, "Twilio accepted the call");
        Ok(created.sid)
    }
}
