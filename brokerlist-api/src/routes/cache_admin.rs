//! Cache Administration Endpoint
//!
//! `POST /api/revalidate` with `Authorization: Bearer <secret>` and a JSON
//! body `{"action": ..., "keys"?: [...], "tags"?: [...]}`.
//!
//! Checks run in order: method (405), token (401), body (400).

use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method},
    routing::any,
    Json, Router,
};
use brokerlist_cache::CacheStats;
use serde::{Deserialize, Serialize};

use crate::auth::authorize_admin;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidateAction {
    Invalidate,
    InvalidateByTag,
    Clear,
    Stats,
    Warmup,
}

impl RevalidateAction {
    pub const ALL: [RevalidateAction; 5] = [
        RevalidateAction::Invalidate,
        RevalidateAction::InvalidateByTag,
        RevalidateAction::Clear,
        RevalidateAction::Stats,
        RevalidateAction::Warmup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RevalidateAction::Invalidate => "invalidate",
            RevalidateAction::InvalidateByTag => "invalidateByTag",
            RevalidateAction::Clear => "clear",
            RevalidateAction::Stats => "stats",
            RevalidateAction::Warmup => "warmup",
        }
    }
}

impl FromStr for RevalidateAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalidate" => Ok(RevalidateAction::Invalidate),
            "invalidateByTag" => Ok(RevalidateAction::InvalidateByTag),
            "clear" => Ok(RevalidateAction::Clear),
            "stats" => Ok(RevalidateAction::Stats),
            "warmup" => Ok(RevalidateAction::Warmup),
            other => {
                let supported: Vec<&str> = Self::ALL.iter().map(|a| a.as_str()).collect();
                Err(ApiError::unknown_action(other)
                    .with_details(serde_json::json!({ "supported": supported })))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevalidateRequest {
    pub action: String,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevalidateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Keys that removed at least one entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidated: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CacheStats>,
}

impl RevalidateResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Non-empty list from an optional body field.
fn required_list(field: &str, values: Option<Vec<String>>) -> ApiResult<Vec<String>> {
    match values {
        Some(values) if !values.is_empty() => Ok(values),
        _ => Err(ApiError::missing_field(field)),
    }
}

// ============================================================================
// HANDLER
// ============================================================================

/// POST /api/revalidate - Cache administration
pub async fn revalidate(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<RevalidateResponse>> {
    if method != Method::POST {
        return Err(ApiError::method_not_allowed());
    }
    authorize_admin(state.admin_token.as_ref(), &headers)?;

    let request: RevalidateRequest = serde_json::from_slice(&body)?;
    let action: RevalidateAction = request.action.parse()?;
    tracing::info!(action = action.as_str(), "Cache admin request");

    let response = match action {
        RevalidateAction::Invalidate => {
            let keys = required_list("keys", request.keys)?;
            let invalidated: Vec<String> = keys
                .into_iter()
                .filter(|key| state.cache.invalidate(key))
                .collect();
            RevalidateResponse {
                count: Some(invalidated.len()),
                invalidated: Some(invalidated),
                ..RevalidateResponse::ok("Invalidated cache entries")
            }
        }
        RevalidateAction::InvalidateByTag => {
            let tags = required_list("tags", request.tags)?;
            let count: usize = tags
                .iter()
                .map(|tag| state.cache.invalidate_by_tag(tag))
                .sum();
            let message = format!("Invalidated cache entries for tags: {}", tags.join(", "));
            RevalidateResponse {
                count: Some(count),
                tags: Some(tags),
                ..RevalidateResponse::ok(message)
            }
        }
        RevalidateAction::Clear => {
            state.cache.clear();
            RevalidateResponse::ok("All cache entries cleared")
        }
        RevalidateAction::Stats => RevalidateResponse {
            success: true,
            stats: Some(state.cache.stats()),
            ..Default::default()
        },
        RevalidateAction::Warmup => {
            let entries = state.listing.warmup().await.map_err(|e| {
                tracing::error!(error = %e, "Cache warmup failed");
                ApiError::warmup_failed(&e)
            })?;
            RevalidateResponse {
                count: Some(entries),
                ..RevalidateResponse::ok("Cache warmed up with common data")
            }
        }
    };

    Ok(Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", any(revalidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        for action in RevalidateAction::ALL {
            assert_eq!(action.as_str().parse::<RevalidateAction>().ok(), Some(action));
        }
        let err = "purge".parse::<RevalidateAction>().expect_err("unknown");
        assert_eq!(err.code, crate::error::ErrorCode::UnknownAction);
        assert!("invalidatebytag".parse::<RevalidateAction>().is_err());
    }

    #[test]
    fn test_unknown_action_lists_supported_actions() {
        let err = "purge".parse::<RevalidateAction>().expect_err("unknown");
        assert_eq!(
            err.details,
            Some(serde_json::json!({
                "supported": ["invalidate", "invalidateByTag", "clear", "stats", "warmup"]
            }))
        );
    }

    #[test]
    fn test_required_list() {
        assert!(required_list("keys", None).is_err());
        assert!(required_list("keys", Some(vec![])).is_err());
        assert_eq!(
            required_list("keys", Some(vec!["a".to_string()])).ok(),
            Some(vec!["a".to_string()])
        );
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let json = serde_json::to_value(RevalidateResponse::ok("done")).expect("serialize");
        assert_eq!(json, serde_json::json!({"success": true, "message": "done"}));
    }
}
