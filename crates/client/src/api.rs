// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed wrappers over the platform's HTTP surface.
//!
//! Thin per-endpoint methods on [`ApiClient`]; all auth handling lives in
//! the dispatcher. Analysis and evidence payloads stay as opaque JSON —
//! the remote analysis engine owns their shape.

use serde::Deserialize;

use crate::credential::UserProfile;
use crate::dispatch::{ApiClient, ApiRequest};
use crate::error::{ApiError, ErrorKind};

/// Standard response envelope used by every platform endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, mapping `success=false` to a rejection carrying
    /// the server's message.
    pub fn into_data(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::new(
                ErrorKind::Rejected,
                self.message.unwrap_or_else(|| "request rejected by server".to_owned()),
            ));
        }
        self.data
            .ok_or_else(|| ApiError::new(ErrorKind::Rejected, "response envelope carried no data"))
    }
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    user: UserProfile,
}

impl ApiClient {
    // -- Analysis -------------------------------------------------------

    /// Fetch a single analysis result.
    pub async fn analysis_result(&self, analysis_id: i64) -> Result<serde_json::Value, ApiError> {
        let resp = self.send(ApiRequest::get(format!("/analysis/{analysis_id}"))).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    /// List the caller's stored analysis results.
    pub async fn analysis_list(&self) -> Result<serde_json::Value, ApiError> {
        let resp = self.send(ApiRequest::get("/analysis")).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    /// Persist an analysis result.
    pub async fn save_analysis(
        &self,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let resp = self.send(ApiRequest::post("/analysis", body)).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    /// Delete an analysis result.
    pub async fn delete_analysis(&self, analysis_id: i64) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/analysis/{analysis_id}"))).await?;
        Ok(())
    }

    // -- Evidence -------------------------------------------------------

    /// List the caller's evidence records.
    pub async fn my_evidence(&self) -> Result<serde_json::Value, ApiError> {
        let resp = self.send(ApiRequest::get("/my-evidence")).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    /// Fetch one evidence record.
    pub async fn evidence_detail(&self, evidence_id: i64) -> Result<serde_json::Value, ApiError> {
        let resp = self.send(ApiRequest::get(format!("/my-evidence/{evidence_id}"))).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    /// Create an evidence record from an analysis.
    pub async fn create_evidence(
        &self,
        chat_analysis_id: i64,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let resp =
            self.send(ApiRequest::post(format!("/evidence/{chat_analysis_id}"), body)).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    /// Delete an evidence record.
    pub async fn delete_evidence(&self, evidence_id: i64) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/my-evidence/{evidence_id}"))).await?;
        Ok(())
    }

    /// Evidence category list.
    pub async fn evidence_categories(&self) -> Result<Vec<String>, ApiError> {
        let resp = self.send(ApiRequest::get("/categories")).await?;
        resp.json::<Envelope<Vec<String>>>()?.into_data()
    }

    // -- Chatbot --------------------------------------------------------

    /// Send a message to the support chatbot (anonymous surface).
    pub async fn chatbot_message(&self, message: &str) -> Result<serde_json::Value, ApiError> {
        let body = serde_json::json!({ "message": message });
        let resp = self.send(ApiRequest::post("/chatbot/message", body)).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    // -- User -----------------------------------------------------------

    /// Fetch the authenticated user's profile.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let resp = self.send(ApiRequest::get("/user/me")).await?;
        Ok(resp.json::<Envelope<ProfileData>>()?.into_data()?.user)
    }

    /// Register a new account (anonymous surface).
    pub async fn signup(&self, body: serde_json::Value) -> Result<serde_json::Value, ApiError> {
        let resp = self.send(ApiRequest::post("/user/signup", body)).await?;
        resp.json::<Envelope<serde_json::Value>>()?.into_data()
    }

    /// Whether an account already exists for `email`.
    pub async fn email_exists(&self, email: &str) -> Result<bool, ApiError> {
        let body = serde_json::json!({ "email": email });
        let resp = self.send(ApiRequest::post("/user/email-exists", body)).await?;
        resp.json::<Envelope<bool>>()?.into_data()
    }
}
