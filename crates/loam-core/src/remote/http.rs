//! reqwest-backed implementation of the remote API

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::{Group, GroupId, Note, NoteId, NotePatch};

use super::{NoteQuery, NotesPage, RemoteApi, RemoteError, RemoteResult, WriteReply};

/// HTTP client for the notes API
#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    /// Create a client for the given API base URL (e.g. `https://api.example.com/api/v1`)
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| RemoteError::Unreachable(error.to_string()))?;
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: Response) -> RemoteResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|error| RemoteError::Api {
                status: status.as_u16(),
                message: format!("invalid response payload: {error}"),
            })
    }
}

/// Write body: the partial field set plus the client's base timestamp
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchBody<'a> {
    #[serde(flatten)]
    patch: &'a NotePatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_updated_at: Option<i64>,
}

#[derive(Deserialize)]
struct NoteEnvelope {
    note: Note,
}

#[derive(Deserialize)]
struct GroupsEnvelope {
    groups: Vec<Group>,
}

impl RemoteApi for HttpRemoteApi {
    async fn patch_note(
        &self,
        id: NoteId,
        patch: &NotePatch,
        base_updated_at: Option<i64>,
    ) -> RemoteResult<WriteReply> {
        let response = self
            .client
            .patch(self.url(&format!("notes/{id}")))
            .json(&PatchBody {
                patch,
                client_updated_at: base_updated_at,
            })
            .send()
            .await
            .map_err(unreachable_error)?;
        Self::parse(response).await
    }

    async fn create_note(&self, group_id: GroupId, patch: &NotePatch) -> RemoteResult<Note> {
        let response = self
            .client
            .post(self.url(&format!("groups/{group_id}/notes")))
            .json(patch)
            .send()
            .await
            .map_err(unreachable_error)?;
        let envelope: NoteEnvelope = Self::parse(response).await?;
        Ok(envelope.note)
    }

    async fn fetch_note(&self, id: NoteId) -> RemoteResult<Note> {
        let response = self
            .client
            .get(self.url(&format!("notes/{id}")))
            .send()
            .await
            .map_err(unreachable_error)?;
        let envelope: NoteEnvelope = Self::parse(response).await?;
        Ok(envelope.note)
    }

    async fn list_notes(&self, group_id: GroupId, query: &NoteQuery) -> RemoteResult<NotesPage> {
        let mut request = self
            .client
            .get(self.url(&format!("groups/{group_id}/notes")))
            .query(&[("page", query.page), ("limit", query.limit)]);
        if let Some(search) = &query.search {
            request = request.query(&[("query", search)]);
        }
        let response = request.send().await.map_err(unreachable_error)?;
        Self::parse(response).await
    }

    async fn delete_note(&self, id: NoteId) -> RemoteResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("notes/{id}")))
            .send()
            .await
            .map_err(unreachable_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        }
    }

    async fn restore_note(&self, id: NoteId) -> RemoteResult<Note> {
        let response = self
            .client
            .post(self.url(&format!("notes/{id}/restore")))
            .send()
            .await
            .map_err(unreachable_error)?;
        let envelope: NoteEnvelope = Self::parse(response).await?;
        Ok(envelope.note)
    }

    async fn list_groups(&self) -> RemoteResult<Vec<Group>> {
        let response = self
            .client
            .get(self.url("groups"))
            .send()
            .await
            .map_err(unreachable_error)?;
        let envelope: GroupsEnvelope = Self::parse(response).await?;
        Ok(envelope.groups)
    }
}

fn unreachable_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Unreachable(error.to_string())
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Validation(message)
        }
        _ => RemoteError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RemoteError::Validation(
            "base URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Validation(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url("https://api.example.com/api/v1/".to_string()).unwrap(),
            "https://api.example.com/api/v1"
        );
    }

    #[test]
    fn status_error_maps_taxonomy() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "{\"error\":\"Note not found\"}"),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, ""),
            RemoteError::Validation(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            RemoteError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn parse_api_error_prefers_structured_body() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            "{\"message\":\" title too long \"}",
        );
        assert_eq!(message, "title too long");

        let fallback = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(fallback, "HTTP 502");
    }

    #[test]
    fn patch_body_carries_base_timestamp() {
        let patch = NotePatch {
            title: Some("t".to_string()),
            ..NotePatch::default()
        };
        let body = PatchBody {
            patch: &patch,
            client_updated_at: Some(42),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["title"], "t");
        assert_eq!(value["clientUpdatedAt"], 42);
        assert!(value.get("content").is_none());
    }
}
