// src/core/remote/sheets.rs

//! An HTTP backend speaking the spreadsheet REST dialect: sheet metadata and
//! structural changes through `:batchUpdate`, cell data through the
//! `values` endpoints.

use super::adapter::{RangeRequest, SheetBackend, SheetRef};
use super::grid::{self, Grid};
use crate::core::MirrorError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

impl From<SheetProperties> for SheetRef {
    fn from(p: SheetProperties) -> Self {
        SheetRef {
            id: p.sheet_id,
            title: p.title,
        }
    }
}

/// Formatted values are strings already; anything else is stringified.
fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn into_grid(range: ValueRange) -> Grid {
    range
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect())
        .collect()
}

#[derive(Debug, Clone)]
pub struct SheetsBackend {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: Option<String>,
}

impl SheetsBackend {
    pub fn new(
        base_url: &str,
        spreadsheet_id: &str,
        access_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, MirrorError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token,
        })
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/v4/spreadsheets/{}", self.base_url, self.spreadsheet_id)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(range)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request and decodes a success body, turning any other
    /// status into `RemoteStatus`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, MirrorError> {
        let res = self.authorize(request).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(MirrorError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = res.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Object(Default::default()))?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn batch_update(&self, requests: Value) -> Result<BatchUpdateResponse, MirrorError> {
        let url = format!("{}:batchUpdate", self.spreadsheet_url());
        self.send(self.client.post(url).json(&json!({ "requests": requests })))
            .await
    }

    async fn put_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), MirrorError> {
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let _: Value = self
            .send(
                self.client
                    .put(self.values_url(range))
                    .query(&[("valueInputOption", "RAW")])
                    .json(&body),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SheetBackend for SheetsBackend {
    async fn list_sheets(&self) -> Result<Vec<SheetRef>, MirrorError> {
        let meta: SpreadsheetMeta = self
            .send(
                self.client
                    .get(self.spreadsheet_url())
                    .query(&[("fields", "sheets.properties")]),
            )
            .await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|entry| entry.properties.into())
            .collect())
    }

    async fn add_sheet(&self, title: &str, headers: &[String]) -> Result<SheetRef, MirrorError> {
        let response = self
            .batch_update(json!([{ "addSheet": { "properties": { "title": title } } }]))
            .await?;
        let properties = response
            .replies
            .into_iter()
            .next()
            .and_then(|mut reply| reply.get_mut("addSheet").map(Value::take))
            .and_then(|mut add| add.get_mut("properties").map(Value::take))
            .ok_or_else(|| {
                MirrorError::MalformedResponse("addSheet reply is missing properties".to_string())
            })?;
        let sheet: SheetRef = serde_json::from_value::<SheetProperties>(properties)?.into();

        if !headers.is_empty() {
            let range = grid::a1_row(&sheet.title, 0, headers.len());
            self.put_values(&range, vec![headers.to_vec()]).await?;
        }
        debug!("Created sheet '{}' (id {}).", sheet.title, sheet.id);
        Ok(sheet)
    }

    async fn batch_get(&self, ranges: &[RangeRequest]) -> Result<Vec<Grid>, MirrorError> {
        let query: Vec<(&str, String)> = ranges
            .iter()
            .map(|r| ("ranges", grid::a1_columns(&r.title, r.width)))
            .collect();
        let url = format!("{}/values:batchGet", self.spreadsheet_url());
        let response: BatchGetResponse = self.send(self.client.get(url).query(&query)).await?;
        Ok(response.value_ranges.into_iter().map(into_grid).collect())
    }

    async fn read_grid(&self, sheet: &SheetRef, width: usize) -> Result<Grid, MirrorError> {
        let range = grid::a1_columns(&sheet.title, width);
        let response: ValueRange = self.send(self.client.get(self.values_url(&range))).await?;
        Ok(into_grid(response))
    }

    async fn append_row(&self, sheet: &SheetRef, row: Vec<String>) -> Result<(), MirrorError> {
        let range = grid::a1_columns(&sheet.title, row.len().max(1));
        let url = format!("{}:append", self.values_url(&range));
        let _: Value = self
            .send(
                self.client
                    .post(url)
                    .query(&[
                        ("valueInputOption", "RAW"),
                        ("insertDataOption", "INSERT_ROWS"),
                    ])
                    .json(&json!({ "majorDimension": "ROWS", "values": [row] })),
            )
            .await?;
        Ok(())
    }

    async fn write_row(
        &self,
        sheet: &SheetRef,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), MirrorError> {
        let range = grid::a1_row(&sheet.title, row_index, row.len().max(1));
        self.put_values(&range, vec![row]).await
    }

    async fn delete_row(&self, sheet: &SheetRef, row_index: usize) -> Result<(), MirrorError> {
        self.batch_update(json!([{
            "deleteDimension": {
                "range": {
                    "sheetId": sheet.id,
                    "dimension": "ROWS",
                    "startIndex": row_index,
                    "endIndex": row_index + 1,
                }
            }
        }]))
        .await?;
        Ok(())
    }
}
