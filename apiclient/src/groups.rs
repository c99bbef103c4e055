// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Group endpoints under `/groups/{groupId}`.

use loomcommon::{
    identifiers::GroupId,
    messages::{
        AppendGroupChainLogRequest, CreateGroupRequest, GroupLogEntry, HeadResponse, LogsPage,
    },
};

use crate::{ApiClient, ApiClientError};

impl ApiClient {
    /// `POST /groups`
    pub async fn create_group(
        &self,
        request: CreateGroupRequest,
    ) -> Result<(), ApiClientError> {
        let _: serde_json::Value = self.post_json("groups", &request).await?;
        Ok(())
    }

    /// `GET /groups/{groupId}/logs/{db}/head`
    pub async fn group_head(
        &self,
        group_id: &GroupId,
        db: &str,
    ) -> Result<Option<GroupLogEntry>, ApiClientError> {
        let response: HeadResponse<GroupLogEntry> = self
            .get_json(&format!("groups/{group_id}/logs/{db}/head"), &[])
            .await?;
        Ok(response.head)
    }

    /// `GET /groups/{groupId}/logs/{db}?startIndex=i&limit=n`
    pub async fn group_logs(
        &self,
        group_id: &GroupId,
        db: &str,
        start_index: u64,
        limit: u32,
    ) -> Result<LogsPage<GroupLogEntry>, ApiClientError> {
        self.get_json(
            &format!("groups/{group_id}/logs/{db}"),
            &[
                ("startIndex", start_index.to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    /// `GET /groups/{groupId}/logs/{db}/{index}`
    pub async fn group_log_at(
        &self,
        group_id: &GroupId,
        db: &str,
        index: u64,
    ) -> Result<GroupLogEntry, ApiClientError> {
        self.get_json(&format!("groups/{group_id}/logs/{db}/{index}"), &[])
            .await
    }

    /// `POST /groups/{groupId}/logs/{db}`
    pub async fn group_append(
        &self,
        group_id: &GroupId,
        db: &str,
        request: AppendGroupChainLogRequest,
    ) -> Result<GroupLogEntry, ApiClientError> {
        self.post_json(&format!("groups/{group_id}/logs/{db}"), &request)
            .await
    }
}
