use serde::Deserialize;
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult, ErrorCode};

use crate::AppState;

/// Group snapshot served by the group service's internal API.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    pub group_id: Uuid,
    pub title: String,
    pub avatar_url: Option<String>,
    pub approved_member_ids: Vec<Uuid>,
}

pub async fn fetch_group(state: &AppState, group_id: Uuid) -> AppResult<GroupInfo> {
    let url = format!(
        "{}/internal/groups/{}",
        state.config.group_service_url, group_id
    );

    let response = state.http_client.get(&url).send().await.map_err(|e| {
        tracing::warn!(error = %e, group_id = %group_id, "group service unreachable");
        AppError::new(ErrorCode::ServiceUnavailable, "group service unavailable")
    })?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(AppError::new(ErrorCode::NotFound, "group not found"));
    }

    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), group_id = %group_id, "group service returned an error");
        return Err(AppError::new(
            ErrorCode::ServiceUnavailable,
            "group service unavailable",
        ));
    }

    response.json::<GroupInfo>().await.map_err(|e| {
        tracing::warn!(error = %e, group_id = %group_id, "group service response malformed");
        AppError::new(ErrorCode::ServiceUnavailable, "group service unavailable")
    })
}

/// Whether the user is an approved member of the group right now.
pub async fn is_approved_member(state: &AppState, group_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let group = fetch_group(state, group_id).await?;
    Ok(group.approved_member_ids.contains(&user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_info_deserializes_with_optional_avatar() {
        let raw = r#"{
            "group_id": "2b0f8dd2-8a2e-4c61-9db1-6f3f2b4c5a01",
            "title": "Vintage bikes",
            "approved_member_ids": ["7f9c24e8-3b0d-4f3a-a9a2-c19d5a6b7c01"]
        }"#;
        let info: GroupInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.title, "Vintage bikes");
        assert!(info.avatar_url.is_none());
        assert_eq!(info.approved_member_ids.len(), 1);
    }
}
