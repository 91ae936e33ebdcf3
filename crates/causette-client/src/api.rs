//! Request/response HTTP client, used outside the live event stream.
//!
//! Covers the three endpoints the event stream does not: history pages,
//! conversation search, and attachment upload.  Every request carries the
//! session's bearer credential.

use reqwest::multipart;
use thiserror::Error;

use causette_shared::types::{FileDescriptor, Message, UserId};

use crate::config::ClientConfig;

/// Errors produced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Cheaply cloneable handle to the HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Fetch one page of conversation history between `me` and `peer`,
    /// ordered oldest first.
    pub async fn fetch_page(
        &self,
        me: &UserId,
        peer: &UserId,
        limit: u32,
        skip: u32,
    ) -> Result<Vec<Message>> {
        let url = format!("{}/messages", self.base_url);
        let page = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("user1", me.as_str()), ("user2", peer.as_str())])
            .query(&[("limit", limit), ("skip", skip)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page)
    }

    /// Search the conversation between `me` and `peer`.
    pub async fn search(
        &self,
        me: &UserId,
        peer: &UserId,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let url = format!("{}/messages/search", self.base_url);
        let hits = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("user1", me.as_str()), ("user2", peer.as_str()), ("q", query)])
            .query(&[("limit", limit)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(hits)
    }

    /// Upload an attachment; the returned descriptor is sent through the
    /// normal send-message path as a file-typed payload.
    pub async fn upload(
        &self,
        from: &UserId,
        to: &UserId,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<FileDescriptor> {
        let url = format!("{}/upload", self.base_url);

        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new()
            .part("file", part)
            .text("from", from.to_string())
            .text("to", to.to_string());

        let descriptor = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(descriptor)
    }
}
