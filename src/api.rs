use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{ApiError, Result, server_message};
use crate::models::{
    AuthResponse, Bug, BugPriority, BugStatus, BugStatusInfo, CreatedBug, DeveloperInfo,
    ReferenceLists, RegisterRequest, RegisteredUser, RoleInfo, SeverityLevel,
};
use crate::session::{TokenPair, TokenStore};

const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Typed accessors for the bug-tracker backend. Every authenticated request
/// carries the stored bearer token; a 401 triggers exactly one token refresh
/// and retry, after which the session is torn down.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: TokenStore,
}

impl ApiClient {
    pub fn new(base_url: &str, store: TokenStore) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // === auth ===

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        read_json(resp, "Invalid credentials").await
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisteredUser> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(req)
            .send()
            .await?;
        read_json(resp, "Registration failed").await
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let resp = self
            .send_authed(|| {
                self.http
                    .post(self.url("/auth/logout"))
                    .json(&json!({ "refreshToken": refresh_token }))
            })
            .await?;
        expect_ok(resp, "Logout failed").await
    }

    /// One refresh attempt with the stored pair. Persists the new pair on
    /// success; clears the store on failure so the caller lands on sign-in.
    async fn refresh_tokens(&self, pair: &TokenPair) -> Result<TokenPair> {
        let resp = self
            .http
            .post(self.url("/auth/refresh-token"))
            .json(&json!({ "token": pair.token, "refreshToken": pair.refresh_token }))
            .send()
            .await;

        let refreshed: Result<AuthResponse> = match resp {
            Ok(r) => read_json(r, "Session refresh failed").await,
            Err(e) => Err(e.into()),
        };

        match refreshed {
            Ok(auth) => {
                let new_pair = TokenPair {
                    token: auth.token,
                    refresh_token: auth.refresh_token,
                };
                self.store.save(&new_pair)?;
                Ok(new_pair)
            }
            Err(e) => {
                log::warn!("token refresh failed, tearing down session: {e}");
                let _ = self.store.clear();
                Err(ApiError::Unauthenticated("session expired".into()))
            }
        }
    }

    /// Send a request with the bearer token, retrying once through a token
    /// refresh on 401. `build` is called per attempt because request bodies
    /// (multipart in particular) are not reusable.
    async fn send_authed<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let pair = self
            .store
            .load()
            .ok_or_else(|| ApiError::Unauthenticated("no stored session".into()))?;

        let resp = build().bearer_auth(&pair.token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        log::info!("got 401, attempting token refresh");
        let new_pair = self.refresh_tokens(&pair).await?;
        Ok(build().bearer_auth(&new_pair.token).send().await?)
    }

    // === bugs ===

    pub async fn list_bugs(&self, query: &BugQuery) -> Result<Vec<Bug>> {
        let params = query.params();
        let resp = self
            .send_authed(|| self.http.get(self.url("/bug/list-bugs")).query(&params))
            .await?;
        read_json(resp, "Failed to fetch bugs").await
    }

    pub async fn my_bugs(&self) -> Result<Vec<Bug>> {
        let resp = self
            .send_authed(|| self.http.get(self.url("/bug/my-bugs")))
            .await?;
        read_json(resp, "Failed to fetch bugs").await
    }

    pub async fn get_bug(&self, id: &str) -> Result<Bug> {
        let resp = self
            .send_authed(|| self.http.get(self.url(&format!("/bug/{id}"))))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("bug {id}")));
        }
        read_json(resp, "Failed to fetch bug details").await
    }

    pub async fn create_bug(&self, report: &NewBugReport) -> Result<CreatedBug> {
        let resp = self
            .send_authed(|| {
                self.http
                    .post(self.url("/bug/create-bug"))
                    .multipart(report.to_form())
            })
            .await?;
        read_json(resp, "Failed to report bug").await
    }

    pub async fn assign_bug(&self, id: &str) -> Result<()> {
        let resp = self
            .send_authed(|| {
                self.http
                    .put(self.url(&format!("/bug/{id}/assign")))
                    .json(&json!({}))
            })
            .await?;
        expect_ok(resp, "Failed to assign bug").await
    }

    pub async fn update_status(&self, id: &str, status: BugStatus) -> Result<()> {
        let resp = self
            .send_authed(|| {
                self.http
                    .put(self.url(&format!("/bug/{id}/status")))
                    .json(&json!({ "status": status.code() }))
            })
            .await?;
        expect_ok(resp, "Failed to update status").await
    }

    // === reference lists ===

    pub async fn roles(&self) -> Result<Vec<RoleInfo>> {
        self.get_list("/list/roles").await
    }

    pub async fn severity_levels(&self) -> Result<Vec<SeverityLevel>> {
        self.get_list("/list/severity-levels").await
    }

    pub async fn developers(&self) -> Result<Vec<DeveloperInfo>> {
        self.get_list("/list/developers").await
    }

    pub async fn statuses(&self) -> Result<Vec<BugStatusInfo>> {
        self.get_list("/list/statuses").await
    }

    /// The four lookups issued concurrently and joined; if any one fails the
    /// whole fetch fails, there is no partial result.
    pub async fn fetch_all_lists(&self) -> Result<ReferenceLists> {
        let (roles, severity_levels, developers, statuses) = futures_util::try_join!(
            self.roles(),
            self.severity_levels(),
            self.developers(),
            self.statuses(),
        )?;
        Ok(ReferenceLists {
            roles,
            severity_levels,
            developers,
            statuses,
        })
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let resp = self.send_authed(|| self.http.get(self.url(path))).await?;
        read_json(resp, "Failed to fetch lists").await
    }
}

/// Optional server-side filters for GET /bug/list-bugs.
#[derive(Debug, Clone, Default)]
pub struct BugQuery {
    pub status: Option<BugStatus>,
    pub priority: Option<BugPriority>,
    pub search: Option<String>,
}

impl BugQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(status) = self.status {
            params.push(("status", status.code().to_string()));
        }
        if let Some(priority) = self.priority {
            params.push(("priority", priority.name().to_string()));
        }
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        params
    }
}

/// A bug-report submission: the multipart form for POST /bug/create-bug.
/// Attachment bytes are read up front so the form can be rebuilt if the
/// request is retried after a token refresh.
#[derive(Debug, Clone)]
pub struct NewBugReport {
    pub title: String,
    pub description: String,
    pub priority: BugPriority,
    pub severity_id: u32,
    pub reproduction_steps: String,
    pub assigned_to_id: Option<String>,
    pub attachments: Vec<AttachmentUpload>,
}

impl NewBugReport {
    fn to_form(&self) -> Form {
        let mut form = Form::new()
            .text("title", self.title.clone())
            .text("description", self.description.clone())
            .text("priority", self.priority.name())
            .text("severityId", self.severity_id.to_string())
            .text("reproductionSteps", self.reproduction_steps.clone());
        if let Some(assignee) = &self.assigned_to_id {
            form = form.text("assignedToId", assignee.clone());
        }
        for attachment in &self.attachments {
            let part = Part::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone());
            // An unparseable content type just falls back to the default.
            let part = match part.mime_str(&attachment.content_type) {
                Ok(p) => p,
                Err(_) => Part::bytes(attachment.bytes.clone())
                    .file_name(attachment.file_name.clone()),
            };
            form = form.part("attachments", part);
        }
        form
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    /// Read a file for upload, rejecting anything over 10 MiB before a byte
    /// goes on the wire.
    pub async fn from_path(path: &std::path::Path) -> Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        if meta.len() > MAX_ATTACHMENT_BYTES {
            return Err(ApiError::Invalid(format!(
                "file {} is too large (max 10MB)",
                path.display()
            )));
        }
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        Ok(AttachmentUpload {
            file_name,
            content_type,
            bytes,
        })
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response, fallback: &str) -> Result<T> {
    let resp = check_status(resp, fallback).await?;
    Ok(resp.json::<T>().await?)
}

async fn expect_ok(resp: Response, fallback: &str) -> Result<()> {
    check_status(resp, fallback).await?;
    Ok(())
}

async fn check_status(resp: Response, fallback: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Server {
        status: status.as_u16(),
        message: server_message(&body, fallback),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_only_include_set_filters() {
        let query = BugQuery {
            status: Some(BugStatus::InProgress),
            priority: None,
            search: Some("login".into()),
        };
        let params = query.params();
        assert_eq!(
            params,
            vec![("status", "2".to_string()), ("search", "login".to_string())]
        );
        assert!(BugQuery::default().params().is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = TokenStore::new(std::env::temp_dir().join("bgtrack-test-none.json"));
        let api = ApiClient::new("http://localhost:5000/", store);
        assert_eq!(api.url("/bug/list-bugs"), "http://localhost:5000/bug/list-bugs");
    }

    #[tokio::test]
    async fn oversized_attachment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_ATTACHMENT_BYTES + 1).unwrap();
        drop(file);
        assert!(matches!(
            AttachmentUpload::from_path(&path).await,
            Err(ApiError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn attachment_picks_up_name_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"png bytes").unwrap();
        let upload = AttachmentUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "shot.png");
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(upload.bytes, b"png bytes");
    }
}
