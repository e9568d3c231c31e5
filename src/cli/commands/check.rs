//! Check command implementation
//!
//! Preflight before a long run: the provider account must be active and
//! funded, and the local tools the methods shell out to should be on
//! `PATH`. Only account problems fail the check; a missing tool makes the
//! methods that need it return failed results, which is reported as a
//! warning.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use reelforge_config::Config;
use reelforge_llm::{AccountReport, HttpClient, RetryPolicy, check_account};
use reelforge_methods::ffmpeg::Ffmpeg;
use reelforge_methods::react_render::{self, Browser, ReactSettings};
use reelforge_methods::{SubtitleSettings, subtitle_only};
use reelforge_utils::exit_codes::ExitCode;

use super::json_emit::emit_check_json;
use crate::setup;

#[derive(Debug, Serialize)]
struct CheckOutput {
    ok: bool,
    provider: String,
    /// Why the account was not queried
    #[serde(skip_serializing_if = "Option::is_none")]
    account_skipped: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    account: Option<AccountReport>,
    tools: BTreeMap<String, ToolView>,
    methods: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ToolView {
    found: bool,
    detail: String,
}

impl ToolView {
    fn from_lookup(lookup: Result<String, String>) -> Self {
        match lookup {
            Ok(path) => Self {
                found: true,
                detail: path,
            },
            Err(detail) => Self {
                found: false,
                detail,
            },
        }
    }
}

/// Account verdict, or the reason it was not queried
async fn account_check(
    config: &Config,
    api_key: Option<String>,
    min_balance: f64,
    offline: bool,
) -> Result<AccountReport, String> {
    if config.llm_provider() == "none" {
        return Err("llm provider is 'none'".to_string());
    }
    if offline {
        return Err("--offline".to_string());
    }
    let Some(api_key) = api_key.filter(|k| !k.trim().is_empty()) else {
        return Ok(AccountReport::rejected(format!(
            "API key not found in environment variable '{}'",
            config.llm_api_key_env()
        )));
    };

    let client = match HttpClient::with_policy(RetryPolicy::with_attempts(config.llm_max_retries())) {
        Ok(client) => client,
        Err(e) => return Ok(AccountReport::rejected(e.to_string())),
    };
    let report = check_account(
        &client,
        config.llm_base_url(),
        &api_key,
        min_balance,
        config.llm_timeout(),
    )
    .await
    .unwrap_or_else(|e| AccountReport::rejected(format!("Account query failed: {e}")));
    Ok(report)
}

async fn check_output(
    config: &Config,
    api_key: Option<String>,
    min_balance: f64,
    offline: bool,
) -> Result<CheckOutput> {
    let registry = setup::build_registry(config)?;
    setup::check_configured_methods(&registry, config)?;

    let (account, account_skipped) = match account_check(config, api_key, min_balance, offline).await {
        Ok(report) => (Some(report), None),
        Err(reason) => (None, Some(reason)),
    };

    let subtitles = SubtitleSettings::from_settings(&config.method_settings(subtitle_only::NAME));
    let react = ReactSettings::from_settings(&config.method_settings(react_render::NAME));
    let mut tools = BTreeMap::new();
    tools.insert(
        "ffmpeg".to_string(),
        ToolView::from_lookup(
            Ffmpeg::locate(subtitles.ffmpeg.as_deref()).map(|f| f.program().display().to_string()),
        ),
    );
    tools.insert(
        "browser".to_string(),
        ToolView::from_lookup(
            Browser::locate(react.browser.as_deref()).map(|b| b.program().display().to_string()),
        ),
    );

    let warnings = tools
        .iter()
        .filter(|(_, tool)| !tool.found)
        .map(|(name, tool)| format!("{name} unavailable, methods using it will fail: {}", tool.detail))
        .collect();

    Ok(CheckOutput {
        ok: account.as_ref().is_none_or(|report| report.valid),
        provider: config.llm_provider().to_string(),
        account_skipped,
        account,
        tools,
        methods: registry.names(),
        warnings,
    })
}

/// Execute `reelforge check`
pub async fn execute_check_command(
    min_balance: f64,
    offline: bool,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let api_key = std::env::var(config.llm_api_key_env()).ok();
    let output = check_output(config, api_key, min_balance, offline).await?;

    if json {
        println!("{}", emit_check_json(&output)?);
    } else {
        print_check(&output);
    }

    Ok(if output.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::PREFLIGHT_FAILED
    })
}

fn print_check(output: &CheckOutput) {
    println!("Provider: {}", output.provider);
    match (&output.account, &output.account_skipped) {
        (Some(report), _) => {
            let verdict = if report.valid { "ok" } else { "REJECTED" };
            println!("Account: {verdict}");
            for key in ["balance", "total_balance"] {
                if let Some(value) = report.details.get(key) {
                    println!("  {key:<14} {value}");
                }
            }
            for error in &report.errors {
                println!("  ✗ {error}");
            }
            for warning in &report.warnings {
                println!("  ! {warning}");
            }
        }
        (None, Some(reason)) => println!("Account: not checked ({reason})"),
        (None, None) => {}
    }

    println!("Tools:");
    for (name, tool) in &output.tools {
        let mark = if tool.found { "✓" } else { "✗" };
        println!("  {mark} {name:<8} {}", tool.detail);
    }
    println!("Methods: {}", output.methods.join(", "));
    for warning in &output.warnings {
        println!("! {warning}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account_body(balance: &str) -> serde_json::Value {
        serde_json::json!({
            "code": 20000,
            "status": true,
            "message": "OK",
            "data": {
                "email": "a@example.com",
                "status": "normal",
                "balance": balance,
                "chargeBalance": "0",
                "totalBalance": balance
            }
        })
    }

    async fn provider(balance: &str) -> (MockServer, Config) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/user/info"))
            .and(header("authorization", "Bearer key-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_body(balance)))
            .mount(&server)
            .await;
        let mut config = Config::builtin();
        config.llm.base_url = Some(format!("{}/v1", server.uri()));
        config.llm.max_retries = Some(1);
        (server, config)
    }

    #[tokio::test]
    async fn test_funded_account_passes() {
        let (_server, config) = provider("500").await;
        let output = check_output(&config, Some("key-1".to_string()), 100.0, false)
            .await
            .unwrap();
        assert!(output.ok);
        assert!(output.account.unwrap().valid);
        assert!(output.methods.contains(&"react_render".to_string()));
        assert!(output.tools.contains_key("ffmpeg"));
        assert!(output.tools.contains_key("browser"));
    }

    #[tokio::test]
    async fn test_underfunded_account_fails() {
        let (_server, config) = provider("12.5").await;
        let output = check_output(&config, Some("key-1".to_string()), 100.0, false)
            .await
            .unwrap();
        assert!(!output.ok);
        let report = output.account.unwrap();
        assert!(report.errors[0].contains("below minimum required (100)"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails() {
        let output = check_output(&Config::builtin(), None, 100.0, false)
            .await
            .unwrap();
        assert!(!output.ok);
        let report = output.account.unwrap();
        assert!(report.errors[0].contains("API key not found"));
    }

    #[tokio::test]
    async fn test_offline_and_disabled_provider_skip_account() {
        let output = check_output(&Config::builtin(), None, 100.0, true)
            .await
            .unwrap();
        assert!(output.ok);
        assert!(output.account.is_none());
        assert_eq!(output.account_skipped.as_deref(), Some("--offline"));

        let mut config = Config::builtin();
        config.llm.provider = Some("none".to_string());
        let output = check_output(&config, Some("key".to_string()), 100.0, false)
            .await
            .unwrap();
        assert!(output.ok);
        assert_eq!(output.account_skipped.as_deref(), Some("llm provider is 'none'"));
    }
}
