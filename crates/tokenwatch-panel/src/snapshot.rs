use std::fmt;

use chrono::{DateTime, SecondsFormat};
use common_auth::{decode_payload, seconds_remaining, TokenPayload};
use serde::Serialize;
use tokenwatch_event::RefreshStatus;

/// Shown in place of a token or value that is not available.
pub const PLACEHOLDER: &str = "—";

/// Raw token strings as read from the store at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenSnapshot {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// What the panel knows about one stored token.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenReport {
    /// Whether the store held a value under the token's key.
    pub present: bool,
    pub payload: Option<TokenPayload>,
}

impl TokenReport {
    pub fn from_raw(raw: Option<&str>) -> Self {
        Self {
            present: raw.is_some(),
            payload: decode_payload(raw),
        }
    }
}

/// One render of the panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PanelSnapshot {
    pub access: TokenReport,
    pub refresh: TokenReport,
    /// Clock reading of the last tick, epoch milliseconds.
    pub now_ms: i64,
    /// `exp - floor(now_ms / 1000)` for the access token, when it has `exp`.
    pub seconds_remaining: Option<i64>,
    pub refresh_status: Option<RefreshStatus>,
    /// Renders published so far, across activations.
    pub renders: u64,
    /// Store snapshots read so far, across activations.
    pub store_reads: u64,
}

impl PanelSnapshot {
    pub(crate) fn derive(
        tokens: &TokenSnapshot,
        now_ms: i64,
        refresh_status: Option<RefreshStatus>,
        renders: u64,
        store_reads: u64,
    ) -> Self {
        let access = TokenReport::from_raw(tokens.access.as_deref());
        let refresh = TokenReport::from_raw(tokens.refresh.as_deref());
        let seconds_remaining = access
            .payload
            .as_ref()
            .and_then(|payload| seconds_remaining(payload, now_ms));
        Self {
            access,
            refresh,
            now_ms,
            seconds_remaining,
            refresh_status,
            renders,
            store_reads,
        }
    }
}

impl fmt::Display for PanelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "access token: {}",
            TokenLine {
                report: &self.access,
                now_ms: self.now_ms,
            }
        )?;
        writeln!(
            f,
            "refresh token: {}",
            TokenLine {
                report: &self.refresh,
                now_ms: self.now_ms,
            }
        )?;
        match &self.refresh_status {
            None => write!(f, "refresh: {PLACEHOLDER}"),
            Some(status) if status.ok => write!(f, "refresh: ok at {}", format_millis(status.at)),
            Some(status) => {
                write!(f, "refresh: FAILED at {}", format_millis(status.at))?;
                if let Some(error) = &status.error {
                    write!(f, " (error: {error})")?;
                }
                Ok(())
            }
        }
    }
}

struct TokenLine<'a> {
    report: &'a TokenReport,
    now_ms: i64,
}

impl fmt::Display for TokenLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = match (&self.report.payload, self.report.present) {
            (Some(payload), _) => payload,
            (None, true) => return write!(f, "{PLACEHOLDER} (undecodable)"),
            (None, false) => return f.write_str(PLACEHOLDER),
        };

        write!(
            f,
            "type={} issued={} expires={}",
            payload.token_type().unwrap_or(PLACEHOLDER),
            format_seconds(payload.iat()),
            format_seconds(payload.exp()),
        )?;
        match seconds_remaining(payload, self.now_ms) {
            Some(remaining) if remaining >= 0 => write!(f, " (remaining {remaining}s)"),
            Some(remaining) => write!(f, " (expired {}s ago)", remaining.unsigned_abs()),
            None => Ok(()),
        }
    }
}

fn format_seconds(epoch_seconds: Option<i64>) -> String {
    epoch_seconds
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn format_millis(epoch_millis: i64) -> String {
    DateTime::from_timestamp_millis(epoch_millis)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| epoch_millis.to_string())
}
