use std::time::Duration;

use anyhow::{Context, Result};
use rep_leaderboard::{DataSource, SourceError, Submission};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::{now_ms, with_nocache};

const ERROR_BODY_PREVIEW: usize = 200;

/// The backing store reached over HTTP: GET returns the row array, POST
/// appends one attempt.
#[derive(Clone)]
pub(crate) struct HttpSource {
    client: reqwest::Client,
    read_url: String,
    submit_url: String,
    token: Option<String>,
}

impl HttpSource {
    pub(crate) fn new(
        read_url: String,
        submit_url: String,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build data source client")?;
        Ok(Self {
            client,
            read_url,
            submit_url,
            token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("x-token", token),
            None => request,
        }
    }
}

#[derive(Serialize)]
struct SubmitEnvelope<'a> {
    data: SubmitData<'a>,
}

#[derive(Serialize)]
struct SubmitData<'a> {
    #[serde(flatten)]
    submission: &'a Submission,
    timestamp: u64,
}

#[derive(Deserialize)]
struct SubmitError {
    message: Option<String>,
    error: Option<String>,
}

impl DataSource for HttpSource {
    async fn fetch(&self, force: bool) -> Result<Value, SourceError> {
        let url = with_nocache(&self.read_url, force);
        let mut request = self.authorize(self.client.get(&url));
        if force {
            request = request.header("Cache-Control", "no-store");
        }

        let response = request
            .send()
            .await
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| SourceError::Transport(format!("invalid JSON body: {}", err)))
    }

    async fn submit(&self, submission: &Submission) -> Result<(), SourceError> {
        let envelope = SubmitEnvelope {
            data: SubmitData {
                submission,
                timestamp: now_ms(),
            },
        };
        let response = self
            .authorize(self.client.post(&self.submit_url))
            .json(&envelope)
            .send()
            .await
            .map_err(|err| SourceError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<SubmitError>(&body)
            .ok()
            .and_then(|parsed| parsed.message.or(parsed.error));
        match message {
            Some(message) => Err(SourceError::Reported { message }),
            None => Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            }),
        }
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((index, _)) => body[..index].to_string(),
        None => body.to_string(),
    }
}
