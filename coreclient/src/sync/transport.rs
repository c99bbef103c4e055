// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Narrow transport interface the controllers pull and append through.
//! The production implementation is [`loomapiclient::ApiClient`]; tests
//! substitute in-memory servers.

use loomapiclient::{ApiClient, ApiClientError};
use loomcommon::{
    identifiers::GroupId,
    messages::{
        AppendChainLogRequest, AppendGroupChainLogRequest, CreateGroupRequest,
        EncryptedChainEntry, GroupLogEntry, LogsPage,
    },
};

#[trait_variant::make(Send)]
pub trait LogTransport {
    async fn personal_head(&self, db: &str)
    -> Result<Option<EncryptedChainEntry>, ApiClientError>;
    async fn personal_logs(
        &self,
        db: &str,
        start_index: u64,
        limit: u32,
    ) -> Result<LogsPage<EncryptedChainEntry>, ApiClientError>;
    async fn personal_append(
        &self,
        db: &str,
        request: AppendChainLogRequest,
    ) -> Result<EncryptedChainEntry, ApiClientError>;

    async fn group_head(
        &self,
        group_id: &GroupId,
        db: &str,
    ) -> Result<Option<GroupLogEntry>, ApiClientError>;
    async fn group_logs(
        &self,
        group_id: &GroupId,
        db: &str,
        start_index: u64,
        limit: u32,
    ) -> Result<LogsPage<GroupLogEntry>, ApiClientError>;
    async fn group_append(
        &self,
        group_id: &GroupId,
        db: &str,
        request: AppendGroupChainLogRequest,
    ) -> Result<GroupLogEntry, ApiClientError>;
    async fn create_group(&self, request: CreateGroupRequest) -> Result<(), ApiClientError>;
}

impl LogTransport for ApiClient {
    async fn personal_head(
        &self,
        db: &str,
    ) -> Result<Option<EncryptedChainEntry>, ApiClientError> {
        ApiClient::personal_head(self, db).await
    }

    async fn personal_logs(
        &self,
        db: &str,
        start_index: u64,
        limit: u32,
    ) -> Result<LogsPage<EncryptedChainEntry>, ApiClientError> {
        ApiClient::personal_logs(self, db, start_index, limit).await
    }

    async fn personal_append(
        &self,
        db: &str,
        request: AppendChainLogRequest,
    ) -> Result<EncryptedChainEntry, ApiClientError> {
        ApiClient::personal_append(self, db, request).await
    }

    async fn group_head(
        &self,
        group_id: &GroupId,
        db: &str,
    ) -> Result<Option<GroupLogEntry>, ApiClientError> {
        ApiClient::group_head(self, group_id, db).await
    }

    async fn group_logs(
        &self,
        group_id: &GroupId,
        db: &str,
        start_index: u64,
        limit: u32,
    ) -> Result<LogsPage<GroupLogEntry>, ApiClientError> {
        ApiClient::group_logs(self, group_id, db, start_index, limit).await
    }

    async fn group_append(
        &self,
        group_id: &GroupId,
        db: &str,
        request: AppendGroupChainLogRequest,
    ) -> Result<GroupLogEntry, ApiClientError> {
        ApiClient::group_append(self, group_id, db, request).await
    }

    async fn create_group(&self, request: CreateGroupRequest) -> Result<(), ApiClientError> {
        ApiClient::create_group(self, request).await
    }
}
