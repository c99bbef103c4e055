// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Personal log endpoints under `/self/logs/{db}`.

use loomcommon::messages::{
    AppendChainLogRequest, EncryptedChainEntry, HeadResponse, LogsPage,
};

use crate::{ApiClient, ApiClientError};

impl ApiClient {
    /// `GET /self/logs/{db}/head`
    pub async fn personal_head(
        &self,
        db: &str,
    ) -> Result<Option<EncryptedChainEntry>, ApiClientError> {
        let response: HeadResponse<EncryptedChainEntry> = self
            .get_json(&format!("self/logs/{db}/head"), &[])
            .await?;
        Ok(response.head)
    }

    /// `GET /self/logs/{db}?startIndex=i&limit=n`
    pub async fn personal_logs(
        &self,
        db: &str,
        start_index: u64,
        limit: u32,
    ) -> Result<LogsPage<EncryptedChainEntry>, ApiClientError> {
        self.get_json(
            &format!("self/logs/{db}"),
            &[
                ("startIndex", start_index.to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    /// `GET /self/logs/{db}/{index}`
    pub async fn personal_log_at(
        &self,
        db: &str,
        index: u64,
    ) -> Result<EncryptedChainEntry, ApiClientError> {
        self.get_json(&format!("self/logs/{db}/{index}"), &[]).await
    }

    /// `POST /self/logs/{db}`
    pub async fn personal_append(
        &self,
        db: &str,
        request: AppendChainLogRequest,
    ) -> Result<EncryptedChainEntry, ApiClientError> {
        self.post_json(&format!("self/logs/{db}"), &request).await
    }
}
