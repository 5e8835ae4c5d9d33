//! Cloud Bigtable Data API v2 over its REST/JSON surface.
//!
//! Only `ReadRows` is used. Bytes fields (keys, qualifiers, values, regexes)
//! travel base64-encoded and 64-bit integers as JSON strings. The response
//! is a JSON array of `ReadRowsResponse` messages written as the server
//! produces them; a failure after streaming started arrives as a final
//! `{"error": ...}` element.

use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

use crate::config::{ClientConfig, TableName};
use crate::error::{Error, Result};
use crate::filter::RowFilter;
use crate::key::RowSet;
use crate::row::Row;
use crate::table::chunk::{CellChunk, ChunkMerger};
use crate::table::Table;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadRowsRequest {
    rows: WireRowSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<WireFilter>,
    /// int64, so a JSON string.
    #[serde(skip_serializing_if = "Option::is_none")]
    rows_limit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRowSet {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    row_keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    row_ranges: Vec<WireRowRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRowRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    start_key_closed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_key_open: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum WireFilter {
    Chain { filters: Vec<WireFilter> },
    ColumnQualifierRegexFilter(String),
    CellsPerColumnLimitFilter(u32),
}

impl From<&RowFilter> for WireFilter {
    fn from(filter: &RowFilter) -> Self {
        match filter {
            RowFilter::ColumnRegex(pattern) => {
                WireFilter::ColumnQualifierRegexFilter(STANDARD.encode(pattern))
            }
            RowFilter::LatestN(n) => WireFilter::CellsPerColumnLimitFilter(*n),
            RowFilter::Chain(filters) => WireFilter::Chain {
                filters: filters.iter().map(WireFilter::from).collect(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadRowsResponse {
    #[serde(default)]
    chunks: Vec<WireChunk>,
    error: Option<ErrorStatus>,
}

impl ReadRowsResponse {
    /// The chunks of this message, or the error it reports.
    fn into_chunks(self) -> Result<Vec<WireChunk>> {
        match self.error {
            Some(error) => Err(error.into_error()),
            None => Ok(self.chunks),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Int64 {
    Number(i64),
    Text(String),
}

impl Int64 {
    fn value(&self) -> Result<i64> {
        match self {
            Int64::Number(n) => Ok(*n),
            Int64::Text(s) => s
                .parse()
                .map_err(|_| Error::Decode(format!("invalid int64 {s:?}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChunk {
    row_key: Option<String>,
    family_name: Option<String>,
    qualifier: Option<String>,
    timestamp_micros: Option<Int64>,
    value: Option<String>,
    #[serde(default)]
    value_size: i32,
    #[serde(default)]
    reset_row: bool,
    #[serde(default)]
    commit_row: bool,
}

impl WireChunk {
    fn decode(self) -> Result<CellChunk> {
        Ok(CellChunk {
            row_key: self.row_key.as_deref().map(decode_text).transpose()?,
            family: self.family_name,
            qualifier: self.qualifier.as_deref().map(decode_text).transpose()?,
            timestamp_micros: self
                .timestamp_micros
                .as_ref()
                .map(Int64::value)
                .transpose()?
                .unwrap_or_default(),
            value: match self.value {
                Some(value) => STANDARD.decode(value)?,
                None => Vec::new(),
            },
            value_size: self.value_size,
            reset_row: self.reset_row,
            commit_row: self.commit_row,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl ErrorStatus {
    fn describe(&self) -> String {
        if self.status.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, self.status)
        }
    }

    /// Payloads without a code are reported as 500.
    fn into_error(self) -> Error {
        Error::Status {
            status: if self.code == 0 { 500 } else { self.code },
            message: self.describe(),
        }
    }
}

fn decode_text(encoded: &str) -> Result<String> {
    let bytes = STANDARD.decode(encoded)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn encode_rows(rows: &RowSet) -> WireRowSet {
    let (keys, ranges) = rows.normalize();
    WireRowSet {
        row_keys: keys.iter().map(|k| STANDARD.encode(k)).collect(),
        row_ranges: ranges
            .iter()
            .map(|r| WireRowRange {
                start_key_closed: (!r.start.is_empty()).then(|| STANDARD.encode(&r.start)),
                end_key_open: (!r.end.is_empty()).then(|| STANDARD.encode(&r.end)),
            })
            .collect(),
    }
}

fn request_body(
    rows: &RowSet,
    filter: Option<&RowFilter>,
    rows_limit: Option<u64>,
) -> ReadRowsRequest {
    ReadRowsRequest {
        rows: encode_rows(rows),
        filter: filter.map(WireFilter::from),
        rows_limit: rows_limit.map(|n| n.to_string()),
    }
}

fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body).or_else(|_| {
        serde_json::from_str::<Vec<ErrorBody>>(body).and_then(|mut all| {
            all.pop()
                .ok_or_else(|| serde::de::Error::custom("empty error array"))
        })
    });
    match parsed {
        Ok(ErrorBody { error }) => error.describe(),
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Nothing consumed yet: expecting `[` or a lone object.
    Start,
    /// After `[`: expecting an element or `]`.
    FirstElement,
    /// After `,`: expecting an element.
    Element,
    /// After an element: expecting `,` or `]`.
    Separator,
    /// A lone top-level object (not wrapped in an array).
    Single,
    Done,
}

/// Incremental parser for the `ReadRows` response body.
///
/// Bytes are fed as they arrive off the socket and every complete
/// `ReadRowsResponse` is returned as soon as its closing brace is seen.
#[derive(Debug)]
struct ResponseDecoder {
    buf: Vec<u8>,
    state: DecodeState,
}

impl ResponseDecoder {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            state: DecodeState::Start,
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<ReadRowsResponse>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            let skip = self
                .buf
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            self.buf.drain(..skip);
            let Some(&next) = self.buf.first() else {
                break;
            };

            match (self.state, next) {
                (DecodeState::Start, b'[') => {
                    self.buf.drain(..1);
                    self.state = DecodeState::FirstElement;
                }
                (DecodeState::Start, b'{') => self.state = DecodeState::Single,
                (DecodeState::FirstElement | DecodeState::Separator, b']') => {
                    self.buf.drain(..1);
                    self.state = DecodeState::Done;
                }
                (DecodeState::Separator, b',') => {
                    self.buf.drain(..1);
                    self.state = DecodeState::Element;
                }
                (DecodeState::FirstElement | DecodeState::Element | DecodeState::Single, b'{') => {
                    match self.next_element()? {
                        Some(response) => {
                            out.push(response);
                            self.state = if self.state == DecodeState::Single {
                                DecodeState::Done
                            } else {
                                DecodeState::Separator
                            };
                        }
                        None => break,
                    }
                }
                (state, byte) => {
                    return Err(Error::Decode(format!(
                        "read rows: unexpected {:?} in response body ({state:?})",
                        byte as char
                    )));
                }
            }
        }
        Ok(out)
    }

    /// Parse one object at the head of the buffer; `None` while it is still
    /// incomplete.
    fn next_element(&mut self) -> Result<Option<ReadRowsResponse>> {
        let (parsed, consumed) = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buf).into_iter::<ReadRowsResponse>();
            let parsed = stream.next();
            (parsed, stream.byte_offset())
        };
        match parsed {
            Some(Ok(response)) => {
                self.buf.drain(..consumed);
                Ok(Some(response))
            }
            Some(Err(err)) if err.is_eof() => Ok(None),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }

    /// Check that the body ended on a message boundary.
    fn finish(&self) -> Result<()> {
        match self.state {
            DecodeState::Done => Ok(()),
            DecodeState::Start if self.buf.is_empty() => Ok(()),
            _ => Err(Error::Decode("read rows: response body truncated".into())),
        }
    }
}

/// Await `fut`, failing with [`Error::Timeout`] once `limit` passes.
async fn within<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, reqwest::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::Timeout(limit)),
    }
}

/// [`Table`] backed by the remote service.
///
/// `ClientConfig::timeout` bounds connecting, the wait for response headers
/// and every gap between body chunks, not the whole transfer.
pub struct RestTable {
    config: ClientConfig,
    url: Url,
    client: reqwest::Client,
}

impl RestTable {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let url = read_rows_url(&config.endpoint, &config.table)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            url,
            client,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn read<F>(
        &self,
        rows: &RowSet,
        filter: Option<&RowFilter>,
        rows_limit: Option<u64>,
        mut on_row: F,
    ) -> Result<()>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        let body = request_body(rows, filter, rows_limit);
        log::debug!("POST {} {rows}", self.url);

        let mut request = self.client.post(self.url.clone()).json(&body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }
        let timeout = self.config.timeout;
        let mut response = within(timeout, request.send()).await?;
        let status = response.status();
        if !status.is_success() {
            let text = within(timeout, response.text()).await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let mut decoder = ResponseDecoder::new();
        let mut merger = ChunkMerger::new();
        let mut delivered = 0usize;
        while let Some(bytes) = within(timeout, response.chunk()).await? {
            for message in decoder.feed(&bytes)? {
                for chunk in message.into_chunks()? {
                    if let Some(row) = merger.push(chunk.decode()?)? {
                        delivered += 1;
                        if !on_row(&row)? {
                            log::debug!("read stopped by caller after {delivered} rows");
                            return Ok(());
                        }
                    }
                }
            }
        }
        decoder.finish()?;
        merger.finish()?;
        log::debug!("read {delivered} rows");
        Ok(())
    }
}

fn read_rows_url(endpoint: &str, table: &TableName) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;
    let method = format!("{}:readRows", table.table);
    url.path_segments_mut()
        .map_err(|_| Error::InvalidEndpoint(ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend([
            "v2",
            "projects",
            table.project.as_str(),
            "instances",
            table.instance.as_str(),
            "tables",
            method.as_str(),
        ]);
    Ok(url)
}

impl Table for RestTable {
    fn name(&self) -> &TableName {
        &self.config.table
    }

    async fn read_rows<F>(&self, rows: &RowSet, filter: Option<&RowFilter>, on_row: F) -> Result<()>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        self.read(rows, filter, None, on_row).await
    }

    async fn read_row(&self, key: &str, filter: Option<&RowFilter>) -> Result<Option<Row>> {
        let mut found = None;
        self.read(&RowSet::single(key), filter, Some(1), |row| {
            found = Some(row.clone());
            Ok(false)
        })
        .await?;
        Ok(found)
    }
}
