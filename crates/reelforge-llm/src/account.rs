//! Provider account preflight
//!
//! Queries `GET {base_url}/user/info` (the SiliconFlow account endpoint)
//! and judges whether the account can pay for a run: it must be active and
//! hold at least the minimum balance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::LlmError;
use crate::http_client::HttpClient;

/// Balance below which an account is rejected
pub const DEFAULT_MIN_BALANCE: f64 = 100.0;

/// Available share of the total balance below which a warning is raised
const LOW_BALANCE_RATIO: f64 = 0.1;

/// Envelope code of a successful `user/info` response
const SUCCESS_CODE: i64 = 20_000;

const PROVIDER: &str = "account";

/// Account endpoint for a base URL; a chat completions URL is accepted too
#[must_use]
pub fn user_info_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let root = trimmed.strip_suffix("/chat/completions").unwrap_or(trimmed);
    format!("{root}/user/info")
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    status: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<UserInfo>,
}

/// Account fields reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub status: Option<String>,
    /// Amounts arrive as decimal strings (`"88.00"`) or numbers
    #[serde(default)]
    pub balance: Option<serde_json::Value>,
    #[serde(default)]
    pub charge_balance: Option<serde_json::Value>,
    #[serde(default)]
    pub total_balance: Option<serde_json::Value>,
}

fn amount(value: Option<&serde_json::Value>) -> Result<f64, String> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(0.0),
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or_else(|| format!("'{n}'")),
        Some(serde_json::Value::String(s)) => {
            s.trim().parse().map_err(|_| format!("'{s}'"))
        }
        Some(other) => Err(format!("'{other}'")),
    }
}

/// Verdict on an account
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl AccountReport {
    /// Report holding a single error
    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    fn detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }
}

/// Judge `info` against `min_balance`
#[must_use]
pub fn assess(info: &UserInfo, min_balance: f64) -> AccountReport {
    let mut report = AccountReport::default();

    match info.status.as_deref() {
        Some("normal") => report.detail("account_status", "normal"),
        other => report.errors.push(format!(
            "Account status is not normal: {}",
            other.unwrap_or("unknown")
        )),
    }
    report.detail("is_admin", info.is_admin);
    for (key, value) in [("user_id", &info.id), ("user_name", &info.name)] {
        if let Some(value) = value {
            report.detail(key, value.as_str());
        }
    }
    match info.email.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(email) => report.detail("user_email", email),
        None => report.warnings.push("User email not available".to_string()),
    }

    let amounts = (
        amount(info.balance.as_ref()),
        amount(info.charge_balance.as_ref()),
        amount(info.total_balance.as_ref()),
    );
    match amounts {
        (Ok(balance), Ok(charge), Ok(total)) => {
            report.detail("balance", balance);
            report.detail("charge_balance", charge);
            report.detail("total_balance", total);
            if balance < min_balance {
                report.errors.push(format!(
                    "Account balance ({balance}) is below minimum required ({min_balance})"
                ));
            } else {
                report.detail("balance_sufficient", true);
            }
            if total < min_balance {
                report.warnings.push(format!(
                    "Total balance ({total}) is below recommended minimum ({min_balance})"
                ));
            }
            if total > 0.0 {
                let ratio = balance / total;
                report.detail("balance_ratio", ratio);
                if ratio < LOW_BALANCE_RATIO {
                    report.warnings.push(format!(
                        "Available balance is only {:.1}% of total balance",
                        ratio * 100.0
                    ));
                }
            }
        }
        (Err(bad), _, _) | (_, Err(bad), _) | (_, _, Err(bad)) => {
            report.errors.push(format!("Invalid balance format: {bad}"));
        }
    }

    report.valid = report.errors.is_empty();
    report
}

/// Fetch the account behind `api_key` and judge it.
///
/// A response the provider marks unsuccessful becomes a rejected report.
///
/// # Errors
///
/// `LlmError` for transport failures and non-success HTTP statuses (401
/// and 403 map to `ProviderAuth`).
pub async fn check_account(
    client: &HttpClient,
    base_url: &str,
    api_key: &str,
    min_balance: f64,
    timeout: Duration,
) -> Result<AccountReport, LlmError> {
    let endpoint = user_info_endpoint(base_url);
    debug!(endpoint = %endpoint, "Checking provider account");
    let response = client
        .execute_with_retry(client.get(&endpoint).bearer_auth(api_key), timeout, PROVIDER)
        .await?;
    let envelope: Envelope = response
        .json()
        .await
        .map_err(|e| LlmError::Transport(format!("Malformed account response: {e}")))?;

    match envelope.data {
        Some(info) if envelope.code == SUCCESS_CODE && envelope.status => {
            Ok(assess(&info, min_balance))
        }
        _ => Ok(AccountReport::rejected(format!(
            "Provider refused the account query: {}",
            envelope.message.as_deref().unwrap_or("unknown error")
        ))),
    }
}
