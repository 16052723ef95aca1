use crate::api::error::AppError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// How far a webhook timestamp may drift before the event is rejected.
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

/// Thin client for the payment processor: checkout sessions, customer
/// portal sessions, and webhook signature verification. Everything else
/// billing-related lives on the processor's side.
pub struct BillingService {
    client: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    price_id: Option<String>,
}

impl BillingService {
    pub fn new(
        secret_key: Option<String>,
        webhook_secret: Option<String>,
        price_id: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            secret_key,
            webhook_secret,
            price_id,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some() && self.price_id.is_some()
    }

    fn secret_key(&self) -> Result<&str, AppError> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| AppError::Internal("Billing is not configured".to_string()))
    }

    /// Create a checkout session for the pro subscription. Returns the
    /// hosted checkout URL the client should redirect to.
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        customer_email: &str,
        customer_id: Option<&str>,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<String, AppError> {
        let secret = self.secret_key()?;
        let price_id = self
            .price_id
            .as_deref()
            .ok_or_else(|| AppError::Internal("Billing price id is not configured".to_string()))?;

        let mut form: Vec<(&str, String)> = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", success_url.to_string()),
            ("cancel_url", cancel_url.to_string()),
            ("client_reference_id", user_id.to_string()),
        ];
        match customer_id {
            Some(id) => form.push(("customer", id.to_string())),
            None => form.push(("customer_email", customer_email.to_string())),
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .bearer_auth(secret)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Billing request failed: {}", e)))?;

        let body: Value = response
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("Billing rejected checkout: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Billing response malformed: {}", e)))?;

        body["url"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Internal("Billing response missing url".to_string()))
    }

    /// Create a customer-portal session for an existing billing customer.
    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, AppError> {
        let secret = self.secret_key()?;

        let form = [("customer", customer_id), ("return_url", return_url)];

        let response = self
            .client
            .post(format!("{}/billing_portal/sessions", self.api_base))
            .bearer_auth(secret)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Billing request failed: {}", e)))?;

        let body: Value = response
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("Billing rejected portal session: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Billing response malformed: {}", e)))?;

        body["url"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Internal("Billing response missing url".to_string()))
    }

    /// Verify a webhook signature header of the form
    /// `t=<timestamp>,v1=<hex hmac>` against the raw request body.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<(), AppError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("Webhook secret is not configured".to_string()))?;

        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::Validation("Malformed webhook signature".to_string()))?;
        if signatures.is_empty() {
            return Err(AppError::Validation(
                "Malformed webhook signature".to_string(),
            ));
        }

        if (Utc::now().timestamp() - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
            return Err(AppError::Validation(
                "Webhook timestamp outside tolerance".to_string(),
            ));
        }

        for candidate in signatures {
            let Ok(candidate_bytes) = hex::decode(candidate) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            if mac.verify_slice(&candidate_bytes).is_ok() {
                return Ok(());
            }
        }

        Err(AppError::Validation(
            "Webhook signature mismatch".to_string(),
        ))
    }

    /// Test/support hook: sign a payload the way the processor would.
    pub fn sign_webhook_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let digest = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, digest)
    }
}
