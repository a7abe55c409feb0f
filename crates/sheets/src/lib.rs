use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::domain::{ServiceAccountCredentials, SpreadsheetKey};
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_TTL_SECONDS: i64 = 3600;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("service account key rejected: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("invalid sheets endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// One cell of a rectangular read/write cycle. Cells travel row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

/// Request descriptor for a rectangular region. `max_row: None` reads
/// through the worksheet's last grid row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRange {
    pub min_row: u32,
    pub max_row: Option<u32>,
    pub min_col: u32,
    pub max_col: u32,
    pub include_empty: bool,
}

/// Resolved worksheet handle: position, identity and grid size. The
/// worksheet itself belongs to the external document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetRef {
    pub sheet_id: i64,
    pub title: String,
    pub row_count: u32,
    pub col_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub author: Option<String>,
    /// Worksheets in document order; callers index 1-based into this.
    pub worksheets: Vec<WorksheetRef>,
}

#[async_trait]
pub trait SheetsConnector: Send + Sync {
    /// Opens a document handle by key. No network traffic happens
    /// until the session is used.
    async fn open(&self, key: &SpreadsheetKey) -> Result<Arc<dyn SpreadsheetSession>, SheetsError>;
}

#[async_trait]
pub trait SpreadsheetSession: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &ServiceAccountCredentials,
    ) -> Result<(), SheetsError>;
    async fn get_info(&self) -> Result<SpreadsheetInfo, SheetsError>;
    /// Cells come back row-major; with `include_empty` the full
    /// rectangle is materialized, blank cells included.
    async fn get_cells(
        &self,
        worksheet: &WorksheetRef,
        range: &CellRange,
    ) -> Result<Vec<Cell>, SheetsError>;
    /// One batched write. Resolves only once the service has
    /// acknowledged the update.
    async fn bulk_update(&self, worksheet: &WorksheetRef, cells: &[Cell])
        -> Result<(), SheetsError>;
}

/// Connector for the Google Sheets v4 API with service-account OAuth.
pub struct GoogleSheets {
    http: Client,
    api_base: Url,
    token_url: Url,
}

impl GoogleSheets {
    pub fn new(http: Client, api_base: Url, token_url: Url) -> Self {
        Self {
            http,
            api_base,
            token_url,
        }
    }
}

#[async_trait]
impl SheetsConnector for GoogleSheets {
    async fn open(&self, key: &SpreadsheetKey) -> Result<Arc<dyn SpreadsheetSession>, SheetsError> {
        Ok(Arc::new(GoogleSheetsSession {
            http: self.http.clone(),
            api_base: self.api_base.clone(),
            token_url: self.token_url.clone(),
            key: key.clone(),
            access_token: RwLock::new(None),
        }))
    }
}

#[derive(Debug, Serialize)]
struct GrantClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DocumentPayload {
    properties: DocumentProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct DocumentProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    row_count: u32,
    column_count: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRangePayload {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

struct GoogleSheetsSession {
    http: Client,
    api_base: Url,
    token_url: Url,
    key: SpreadsheetKey,
    access_token: RwLock<Option<String>>,
}

impl GoogleSheetsSession {
    async fn bearer_token(&self) -> Result<String, SheetsError> {
        self.access_token
            .read()
            .await
            .clone()
            .ok_or(SheetsError::NotAuthenticated)
    }

    fn document_endpoint(&self) -> Result<Url, url::ParseError> {
        self.api_base
            .join(&format!("v4/spreadsheets/{}", self.key))
    }

    fn values_endpoint(&self, range: &str) -> Result<Url, url::ParseError> {
        self.api_base
            .join(&format!("v4/spreadsheets/{}/values/{}", self.key, range))
    }
}

#[async_trait]
impl SpreadsheetSession for GoogleSheetsSession {
    async fn authenticate(
        &self,
        credentials: &ServiceAccountCredentials,
    ) -> Result<(), SheetsError> {
        let now = Utc::now().timestamp();
        let claims = GrantClaims {
            iss: credentials.client_email.clone(),
            scope: SPREADSHEETS_SCOPE.to_string(),
            aud: self.token_url.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECONDS,
        };
        let signing_key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SheetsError::AuthRejected(detail));
        }
        let token: TokenResponse = response.json().await?;
        *self.access_token.write().await = Some(token.access_token);
        Ok(())
    }

    async fn get_info(&self) -> Result<SpreadsheetInfo, SheetsError> {
        let token = self.bearer_token().await?;
        let document: DocumentPayload = self
            .http
            .get(self.document_endpoint()?)
            .bearer_auth(&token)
            .query(&[("fields", "properties.title,sheets.properties")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(SpreadsheetInfo {
            title: document.properties.title,
            author: None,
            worksheets: document
                .sheets
                .into_iter()
                .map(|sheet| WorksheetRef {
                    sheet_id: sheet.properties.sheet_id,
                    title: sheet.properties.title,
                    row_count: sheet.properties.grid_properties.row_count,
                    col_count: sheet.properties.grid_properties.column_count,
                })
                .collect(),
        })
    }

    async fn get_cells(
        &self,
        worksheet: &WorksheetRef,
        range: &CellRange,
    ) -> Result<Vec<Cell>, SheetsError> {
        let end_row = range.max_row.unwrap_or(worksheet.row_count);
        if end_row < range.min_row {
            return Ok(Vec::new());
        }
        let token = self.bearer_token().await?;
        let a1 = a1_range(
            &worksheet.title,
            range.min_row,
            end_row,
            range.min_col,
            range.max_col,
        );
        let payload: ValueRangePayload = self
            .http
            .get(self.values_endpoint(&a1)?)
            .bearer_auth(&token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(flatten_rows(payload.values, end_row, range))
    }

    async fn bulk_update(
        &self,
        worksheet: &WorksheetRef,
        cells: &[Cell],
    ) -> Result<(), SheetsError> {
        let Some((a1, values)) = bounding_values(&worksheet.title, cells) else {
            return Ok(());
        };
        let token = self.bearer_token().await?;
        self.http
            .put(self.values_endpoint(&a1)?)
            .bearer_auth(&token)
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({
                "range": a1,
                "majorDimension": "ROWS",
                "values": values,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// 1-based column index to its letter name (1 -> A, 27 -> AA).
fn column_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn a1_range(title: &str, min_row: u32, max_row: u32, min_col: u32, max_col: u32) -> String {
    format!(
        "'{}'!{}{}:{}{}",
        title.replace('\'', "''"),
        column_letter(min_col),
        min_row,
        column_letter(max_col),
        max_row
    )
}

/// Expands the sparse row payload into the row-major cell list the
/// callers index into. Rows and columns the service omitted become
/// empty cells when the range asks for them.
fn flatten_rows(values: Vec<Vec<String>>, end_row: u32, range: &CellRange) -> Vec<Cell> {
    let mut cells = Vec::new();
    for row in range.min_row..=end_row {
        for col in range.min_col..=range.max_col {
            let value = values
                .get((row - range.min_row) as usize)
                .and_then(|cols| cols.get((col - range.min_col) as usize))
                .cloned()
                .unwrap_or_default();
            if !range.include_empty && value.is_empty() {
                continue;
            }
            cells.push(Cell { row, col, value });
        }
    }
    cells
}

/// Rebuilds the rectangle covered by `cells` as an A1 range plus the
/// row-major value matrix for one batched write. Cells outside a full
/// rectangle are filled with empty strings.
fn bounding_values(title: &str, cells: &[Cell]) -> Option<(String, Vec<Vec<String>>)> {
    let min_row = cells.iter().map(|c| c.row).min()?;
    let max_row = cells.iter().map(|c| c.row).max()?;
    let min_col = cells.iter().map(|c| c.col).min()?;
    let max_col = cells.iter().map(|c| c.col).max()?;

    let width = (max_col - min_col + 1) as usize;
    let height = (max_row - min_row + 1) as usize;
    let mut values = vec![vec![String::new(); width]; height];
    for cell in cells {
        values[(cell.row - min_row) as usize][(cell.col - min_col) as usize] = cell.value.clone();
    }

    Some((a1_range(title, min_row, max_row, min_col, max_col), values))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
