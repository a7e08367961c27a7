use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::http::HeaderValue;

use crate::pagination::policy::{parse_keyword_list, parse_role_list, PageBreakConfig};
use crate::pagination::units::PageBudget;
use crate::pagination::PaginationSettings;

/// Application configuration loaded from environment variables.
/// Every variable has a default; startup fails only on values that do not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub pagination: PaginationSettings,
    /// Idle time after which a preview session is dropped.
    pub session_ttl: Duration,
    /// CORS origins; empty allows any origin.
    pub allowed_origins: Vec<HeaderValue>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = PageBudget::default();
        let budget = PageBudget {
            page_height_pt: parse_or(&lookup, "PAGER_PAGE_HEIGHT_PT", defaults.page_height_pt)?,
            margin_allowance_pt: parse_or(
                &lookup,
                "PAGER_MARGIN_ALLOWANCE_PT",
                defaults.margin_allowance_pt,
            )?,
            px_to_pt: parse_or(&lookup, "PAGER_PX_TO_PT", defaults.px_to_pt)?,
            ..defaults
        };
        budget
            .validate()
            .map_err(|e| anyhow!(e))
            .context("Invalid page budget")?;

        let force_break_after = match lookup("PAGER_FORCE_BREAK_AFTER") {
            Some(raw) => parse_role_list(&raw)
                .map_err(|e| anyhow!(e))
                .context("PAGER_FORCE_BREAK_AFTER must be a comma-separated list of section roles")?,
            None => Vec::new(),
        };

        let defaults = PageBreakConfig::default();
        let force_break_after_titles = match lookup("PAGER_FORCE_BREAK_AFTER_TITLES") {
            Some(raw) => parse_keyword_list(&raw),
            None => defaults.force_break_after_titles.clone(),
        };

        let break_config = PageBreakConfig {
            enable_smart_breaks: parse_or(&lookup, "PAGER_SMART_BREAKS", true)?,
            force_break_after,
            force_break_after_titles,
            ..defaults
        };

        let debounce_ms: u64 = parse_or(&lookup, "PAGER_RECOMPUTE_DEBOUNCE_MS", 100)?;

        let session_ttl_secs: u64 = parse_or(&lookup, "PAGER_SESSION_TTL_SECS", 1800)?;
        if session_ttl_secs == 0 {
            bail!("PAGER_SESSION_TTL_SECS must be greater than zero");
        }

        let allowed_origins = lookup("PAGER_ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .transpose()?
            .unwrap_or_default();

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            pagination: PaginationSettings {
                break_config,
                budget,
                debounce: Duration::from_millis(debounce_ms),
            },
            session_ttl: Duration::from_secs(session_ttl_secs),
            allowed_origins,
        })
    }
}

fn parse_origins(raw: &str) -> Result<Vec<HeaderValue>> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("PAGER_ALLOWED_ORIGINS has an invalid origin '{origin}'"))
        })
        .collect()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
