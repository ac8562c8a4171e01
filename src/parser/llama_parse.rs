//! Client for the LlamaParse job API.
//!
//! A parse is three steps: upload the file to create a job, poll the job until it reaches a
//! terminal status, then download the per-page JSON result. Each page becomes one fragment
//! labelled with its page number.

use super::{DocumentParser, Fragment, FragmentMetadata, ParserError};
use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Connection and polling settings for [`LlamaParseClient`].
#[derive(Debug, Clone)]
pub struct LlamaParseSettings {
    /// Base URL of the parsing service.
    pub base_url: String,
    /// Bearer token presented on every request.
    pub api_key: Option<String>,
    /// Delay between job status polls.
    pub poll_interval: Duration,
    /// Maximum number of status polls before giving up.
    pub max_polls: u32,
    /// Document language hint.
    pub language: String,
}

/// Remote parser producing markdown fragments, one per page.
pub struct LlamaParseClient {
    http: Client,
    settings: LlamaParseSettings,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonResult {
    #[serde(default)]
    pages: Vec<PageResult>,
}

#[derive(Debug, Deserialize)]
struct PageResult {
    page: u32,
    #[serde(default)]
    md: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl LlamaParseClient {
    /// Build a client with the given settings.
    pub fn new(settings: LlamaParseSettings) -> Result<Self, ParserError> {
        let http = Client::builder()
            .user_agent("docqa/parser")
            .build()
            .map_err(|error| ParserError::Service(error.to_string()))?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.settings.api_key.as_deref() {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ParserError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|error| ParserError::Service(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ParserError::Service(format!(
                "parsing service returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|error| ParserError::InvalidResponse(error.to_string()))
    }

    async fn upload(&self, path: &Path, file_name: &str) -> Result<String, ParserError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ParserError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("language", self.settings.language.clone())
            .text("result_type", "markdown");

        let job: JobResponse = self
            .send(self.http.post(self.url("api/parsing/upload")).multipart(form))
            .await?;
        tracing::debug!(job_id = %job.id, file = file_name, "Parse job created");
        Ok(job.id)
    }

    async fn wait_for_job(&self, job_id: &str) -> Result<(), ParserError> {
        for poll in 1..=self.settings.max_polls {
            let job: JobResponse = self
                .send(self.http.get(self.url(&format!("api/parsing/job/{job_id}"))))
                .await?;
            let status = job.status.unwrap_or_default().to_uppercase();
            match status.as_str() {
                "SUCCESS" => return Ok(()),
                "PENDING" | "" => {
                    tracing::trace!(job_id, poll, "Parse job still pending");
                    if poll < self.settings.max_polls {
                        tokio::time::sleep(self.settings.poll_interval).await;
                    }
                }
                _ => {
                    return Err(ParserError::JobFailed {
                        job_id: job_id.to_string(),
                        status,
                    });
                }
            }
        }

        Err(ParserError::Timeout {
            job_id: job_id.to_string(),
            polls: self.settings.max_polls,
        })
    }
}

#[async_trait]
impl DocumentParser for LlamaParseClient {
    async fn parse(&self, path: &Path, file_name: &str) -> Result<Vec<Fragment>, ParserError> {
        let job_id = self.upload(path, file_name).await?;
        self.wait_for_job(&job_id).await?;

        let result: JsonResult = self
            .send(
                self.http
                    .get(self.url(&format!("api/parsing/job/{job_id}/result/json"))),
            )
            .await?;

        let file_path = path.display().to_string();
        let fragments: Vec<Fragment> = result
            .pages
            .into_iter()
            .filter_map(|page| {
                let text = page
                    .md
                    .filter(|md| !md.trim().is_empty())
                    .or(page.text)
                    .filter(|text| !text.trim().is_empty())?;
                Some(Fragment {
                    text,
                    metadata: FragmentMetadata {
                        file_name: Some(file_name.to_string()),
                        page_label: Some(page.page.to_string()),
                        file_path: Some(file_path.clone()),
                    },
                })
            })
            .collect();

        tracing::debug!(job_id, file = file_name, fragments = fragments.len(), "Parse job complete");
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use serde_json::json;
    use tempfile::tempdir;

    fn client(server: &MockServer, max_polls: u32) -> LlamaParseClient {
        client_with_interval(server, max_polls, Duration::from_millis(0))
    }

    fn client_with_interval(
        server: &MockServer,
        max_polls: u32,
        poll_interval: Duration,
    ) -> LlamaParseClient {
        LlamaParseClient::new(LlamaParseSettings {
            base_url: server.base_url(),
            api_key: Some("llx-test".into()),
            poll_interval,
            max_polls,
            language: "en".into(),
        })
        .expect("client")
    }

    fn stored_pdf() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("stored.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%fake").expect("write");
        (dir, path)
    }

    #[tokio::test]
    async fn parses_pages_into_labelled_fragments() {
        let server = MockServer::start_async().await;
        let upload = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/parsing/upload")
                    .header("authorization", "Bearer llx-test");
                then.status(200)
                    .json_body(json!({ "id": "job-1", "status": "PENDING" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/parsing/job/job-1");
                then.status(200)
                    .json_body(json!({ "id": "job-1", "status": "SUCCESS" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/parsing/job/job-1/result/json");
                then.status(200).json_body(json!({
                    "pages": [
                        { "page": 1, "md": "# Summary\nRevenue grew.", "text": "Summary" },
                        { "page": 2, "md": "", "text": "Plain second page" },
                        { "page": 3, "md": "  ", "text": "" }
                    ]
                }));
            })
            .await;

        let (_dir, path) = stored_pdf();
        let fragments = client(&server, 3)
            .parse(&path, "report.pdf")
            .await
            .expect("parse");

        upload.assert_async().await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "# Summary\nRevenue grew.");
        assert_eq!(fragments[0].metadata.page_label.as_deref(), Some("1"));
        assert_eq!(fragments[1].text, "Plain second page");
        assert_eq!(fragments[1].metadata.page_label.as_deref(), Some("2"));
        assert!(
            fragments
                .iter()
                .all(|fragment| fragment.metadata.file_name.as_deref() == Some("report.pdf"))
        );
    }

    #[tokio::test]
    async fn failed_job_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/parsing/upload");
                then.status(200).json_body(json!({ "id": "job-2" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/parsing/job/job-2");
                then.status(200)
                    .json_body(json!({ "id": "job-2", "status": "ERROR" }));
            })
            .await;

        let (_dir, path) = stored_pdf();
        let error = client(&server, 3)
            .parse(&path, "broken.pdf")
            .await
            .expect_err("job failure");
        assert!(matches!(error, ParserError::JobFailed { ref status, .. } if status == "ERROR"));
    }

    #[tokio::test]
    async fn pending_job_times_out_after_poll_budget() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/parsing/upload");
                then.status(200).json_body(json!({ "id": "job-3" }));
            })
            .await;
        let status = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/parsing/job/job-3");
                then.status(200)
                    .json_body(json!({ "id": "job-3", "status": "PENDING" }));
            })
            .await;

        let (_dir, path) = stored_pdf();
        let error = client(&server, 2)
            .parse(&path, "slow.pdf")
            .await
            .expect_err("timeout");

        status.assert_hits_async(2).await;
        assert!(matches!(error, ParserError::Timeout { polls: 2, .. }));
    }

    #[tokio::test]
    async fn final_pending_poll_times_out_without_waiting() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/parsing/upload");
                then.status(200).json_body(json!({ "id": "job-4" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/parsing/job/job-4");
                then.status(200)
                    .json_body(json!({ "id": "job-4", "status": "PENDING" }));
            })
            .await;

        let (_dir, path) = stored_pdf();
        let started = std::time::Instant::now();
        let error = client_with_interval(&server, 1, Duration::from_secs(30))
            .parse(&path, "slow.pdf")
            .await
            .expect_err("timeout");

        assert!(matches!(error, ParserError::Timeout { polls: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn rate_limited_upload_surfaces_service_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/parsing/upload");
                then.status(429).body("too many requests");
            })
            .await;

        let (_dir, path) = stored_pdf();
        let error = client(&server, 2)
            .parse(&path, "busy.pdf")
            .await
            .expect_err("rate limited");
        assert!(matches!(error, ParserError::Service(ref message) if message.contains("429")));
    }
}
