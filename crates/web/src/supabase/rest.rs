//! PostgREST (`/rest/v1/{table}`) endpoints for stock rows.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use stockroom_core::{NewStockRow, ProposedRow, StockRowId};
use tracing::{debug, instrument};
use url::Url;

use super::{SupabaseClient, SupabaseError, check_status};
use crate::services::store::{RowStore, StoreError};

/// PostgREST `in` filter value: `in.(1,2,3)`.
fn in_filter(ids: &[StockRowId]) -> String {
    let list = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({list})")
}

impl SupabaseClient {
    fn table_url(&self) -> Result<Url, SupabaseError> {
        self.endpoint(&["rest", "v1", self.table.as_str()])
    }

    fn rows_request(
        &self,
        method: reqwest::Method,
        url: Url,
        access_token: &SecretString,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", self.anon_key())
            .bearer_auth(access_token.expose_secret())
    }

    /// `GET /rest/v1/{table}?select=*&order=id.desc`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or PostgREST rejects it.
    #[instrument(skip_all, fields(table = %self.table))]
    pub async fn select_rows(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<serde_json::Value>, SupabaseError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", "id.desc");

        let response = self
            .rows_request(reqwest::Method::GET, url, access_token)
            .send()
            .await
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        let rows: Vec<serde_json::Value> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| SupabaseError::Response(e.to_string()))?;

        debug!(count = rows.len(), "Fetched stock rows");
        Ok(rows)
    }

    /// `POST /rest/v1/{table}`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or PostgREST rejects the row.
    #[instrument(skip(self, access_token), fields(table = %self.table))]
    pub async fn insert_row(
        &self,
        access_token: &SecretString,
        row: &NewStockRow,
    ) -> Result<(), SupabaseError> {
        let response = self
            .rows_request(reqwest::Method::POST, self.table_url()?, access_token)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }

    /// `PATCH /rest/v1/{table}?id=eq.{id}`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or PostgREST rejects the change.
    #[instrument(skip(self, access_token), fields(table = %self.table, id = %proposed.id))]
    pub async fn update_row(
        &self,
        access_token: &SecretString,
        proposed: &ProposedRow,
    ) -> Result<(), SupabaseError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", proposed.id));

        let response = self
            .rows_request(reqwest::Method::PATCH, url, access_token)
            .header("Prefer", "return=minimal")
            .json(proposed)
            .send()
            .await
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }

    /// `DELETE /rest/v1/{table}?id=in.({ids})`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or PostgREST rejects the delete.
    #[instrument(skip(self, access_token), fields(table = %self.table, count = ids.len()))]
    pub async fn delete_rows(
        &self,
        access_token: &SecretString,
        ids: &[StockRowId],
    ) -> Result<(), SupabaseError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut().append_pair("id", &in_filter(ids));

        let response = self
            .rows_request(reqwest::Method::DELETE, url, access_token)
            .send()
            .await
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }
}

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Api { message, .. } => Self::Rejected(message),
            SupabaseError::Request(msg) | SupabaseError::InvalidUrl(msg) => Self::Unavailable(msg),
            SupabaseError::Response(msg) => Self::InvalidResponse(msg),
        }
    }
}

#[async_trait]
impl RowStore for SupabaseClient {
    async fn select(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        Ok(self.select_rows(access_token).await?)
    }

    async fn insert(
        &self,
        access_token: &SecretString,
        row: &NewStockRow,
    ) -> Result<(), StoreError> {
        Ok(self.insert_row(access_token, row).await?)
    }

    async fn update(
        &self,
        access_token: &SecretString,
        proposed: &ProposedRow,
    ) -> Result<(), StoreError> {
        Ok(self.update_row(access_token, proposed).await?)
    }

    async fn delete(
        &self,
        access_token: &SecretString,
        ids: &[StockRowId],
    ) -> Result<(), StoreError> {
        Ok(self.delete_rows(access_token, ids).await?)
    }
}
