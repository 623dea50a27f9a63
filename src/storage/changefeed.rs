//! Blob change feed reader.
//!
//! The change feed lives in the `$blobchangefeed` container:
//!
//! - `meta/segments.json` names the last consumable segment time.
//! - `idx/segments/YYYY/MM/DD/HH00/meta.json` is one manifest per hour,
//!   listing the shard directories of that hour.
//! - Each shard directory holds Avro object container files (chunks) whose
//!   records are change events.
//!
//! Pages are read statelessly from a JSON cursor, so a cursor returned by one
//! process can be resumed by another.

use apache_avro::Reader;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{parse_account_url, parse_iso8601, resource_url, StorageCredential, StorageTransport};
use crate::connection_string::StorageConnectionString;
use crate::errors::{Error, Result};
use crate::pager::{Page, Pager};
use crate::pipeline::{ClientOptions, RawResponse};

/// Container holding the change feed.
pub const CHANGE_FEED_CONTAINER: &str = "$blobchangefeed";

const SEGMENTS_META: &str = "meta/segments.json";
const SEGMENT_INDEX_PREFIX: &str = "idx/segments/";
const CURSOR_VERSION: u32 = 1;

/// Default number of events per page.
pub const DEFAULT_RESULTS_PER_PAGE: usize = 5000;

/// Options for [`ChangeFeedClient::list_changes`].
#[derive(Debug, Clone, Default)]
pub struct ListChangesOptions {
    /// Inclusive lower bound on `eventTime`.
    pub start_time: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `eventTime`.
    pub end_time: Option<DateTime<Utc>>,
    pub results_per_page: Option<usize>,
    /// Resume from a cursor returned by an earlier page.  Start and end times
    /// are then taken from the cursor.
    pub continuation_token: Option<String>,
}

/// Resume position.  Serialized as the page continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeFeedCursor {
    cursor_version: u32,
    url_host: String,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    segment_path: String,
    shard_index: usize,
    chunk_path: String,
    /// Index of the next event to read in `chunk_path`.
    event_index: usize,
}

/// Hour encoded in `idx/segments/YYYY/MM/DD/HHMM/meta.json`.
fn segment_time(path: &str) -> Option<DateTime<Utc>> {
    let rest = path.strip_prefix(SEGMENT_INDEX_PREFIX)?;
    let mut parts = rest.split('/');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let hhmm = parts.next()?;
    if hhmm.len() != 4 {
        return None;
    }
    let hour: u32 = hhmm[..2].parse().ok()?;
    let minute: u32 = hhmm[2..].parse().ok()?;
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).single()
}

fn floor_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), 0, 0)
        .single()
        .unwrap_or(t)
}

/// Blob name inside the change feed container (drops a leading `$blobchangefeed/`).
fn strip_container(path: &str) -> &str {
    path.trim_start_matches('/')
        .strip_prefix(CHANGE_FEED_CONTAINER)
        .map(|p| p.trim_start_matches('/'))
        .unwrap_or(path)
}

/// Decode every record of an Avro object container file as JSON.
pub(crate) fn decode_chunk(data: &[u8]) -> Result<Vec<Value>> {
    let reader = Reader::new(data).map_err(Error::decode)?;
    reader
        .map(|record| {
            let record = record.map_err(Error::decode)?;
            Value::try_from(record).map_err(Error::decode)
        })
        .collect()
}

/// Reads change events from an account's change feed.
#[derive(Debug, Clone)]
pub struct ChangeFeedClient {
    transport: StorageTransport,
    account_url: url::Url,
}

impl ChangeFeedClient {
    /// `account_url` is the blob endpoint.
    pub fn new(
        account_url: &str,
        credential: StorageCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let account_url = parse_account_url(account_url)?;
        let transport = StorageTransport::new(&account_url, credential, options)?;
        Ok(Self {
            transport,
            account_url,
        })
    }

    pub fn from_connection_string(connection_string: &str, options: &ClientOptions) -> Result<Self> {
        let cs = StorageConnectionString::parse(connection_string)?;
        let credential = StorageCredential::from_connection_string(&cs)?;
        Self::new(&cs.blob_endpoint, credential, options)
    }

    fn host(&self) -> String {
        self.account_url.host_str().unwrap_or_default().to_string()
    }

    /// Page through change events.
    pub fn list_changes(&self, options: ListChangesOptions) -> Result<Pager<Value>> {
        let page_size = options
            .results_per_page
            .unwrap_or(DEFAULT_RESULTS_PER_PAGE)
            .max(1);
        let (start_time, end_time, cursor) = match &options.continuation_token {
            Some(token) => {
                let cursor: ChangeFeedCursor = serde_json::from_str(token)
                    .map_err(|e| Error::invalid(format!("invalid change feed cursor: {}", e)))?;
                if cursor.cursor_version != CURSOR_VERSION {
                    return Err(Error::invalid(format!(
                        "unsupported change feed cursor version {}",
                        cursor.cursor_version
                    )));
                }
                if cursor.url_host != self.host() {
                    return Err(Error::invalid(
                        "the continuation token is not for the current storage account",
                    ));
                }
                (cursor.start_time, cursor.end_time, Some(cursor))
            }
            None => (options.start_time, options.end_time, None),
        };
        if let (Some(s), Some(e)) = (start_time, end_time) {
            if e < s {
                return Err(Error::invalid("end_time must not be earlier than start_time"));
            }
        }

        let client = self.clone();
        let initial = cursor
            .map(|c| serde_json::to_string(&c))
            .transpose()?;
        Ok(Pager::new(initial, move |token| {
            let client = client.clone();
            async move {
                let cursor = token
                    .map(|t| serde_json::from_str::<ChangeFeedCursor>(&t))
                    .transpose()?;
                client.read_page(start_time, end_time, page_size, cursor).await
            }
        }))
    }

    async fn read_page(
        &self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        page_size: usize,
        cursor: Option<ChangeFeedCursor>,
    ) -> Result<Page<Value>> {
        let meta: Value = self.get_blob(SEGMENTS_META).await?.json()?;
        let last_consumable = meta
            .get("lastConsumable")
            .and_then(Value::as_str)
            .and_then(parse_iso8601);
        let Some(last_consumable) = last_consumable else {
            debug!("Change feed has no consumable segments yet");
            return Ok(Page::new(Vec::new(), None));
        };
        let segment_end = match end_time {
            Some(end) if end < last_consumable => end,
            _ => last_consumable,
        };
        let segment_start = start_time.map(floor_to_hour);

        let segments = self.list_segments(segment_start, segment_end).await?;
        let mut events = Vec::with_capacity(page_size);

        for segment_path in segments {
            if let Some(c) = &cursor {
                if segment_path < c.segment_path {
                    continue;
                }
            }
            let resume = cursor.as_ref().filter(|c| c.segment_path == segment_path);
            let manifest: Value = self.get_blob(&segment_path).await?.json()?;
            let shards: Vec<String> = manifest
                .get("chunkFilePaths")
                .and_then(Value::as_array)
                .map(|paths| {
                    paths
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|p| strip_container(p).to_string())
                        .collect()
                })
                .unwrap_or_default();

            for (shard_index, shard) in shards.iter().enumerate() {
                if resume.is_some_and(|c| shard_index < c.shard_index) {
                    continue;
                }
                let resume_shard = resume.filter(|c| c.shard_index == shard_index);
                let (mut chunks, _) = self.list_blobs(shard, None).await?;
                chunks.sort();

                for chunk in chunks {
                    if resume_shard.is_some_and(|c| chunk < c.chunk_path) {
                        continue;
                    }
                    let skip = resume_shard
                        .filter(|c| c.chunk_path == chunk)
                        .map(|c| c.event_index)
                        .unwrap_or(0);
                    let body = self.get_blob(&chunk).await?.body;
                    let records = decode_chunk(&body)?;
                    for (index, event) in records.into_iter().enumerate().skip(skip) {
                        let event_time = event
                            .get("eventTime")
                            .and_then(Value::as_str)
                            .and_then(parse_iso8601);
                        let in_range = match event_time {
                            Some(t) => {
                                start_time.map_or(true, |s| t >= s)
                                    && end_time.map_or(true, |e| t < e)
                            }
                            None => true,
                        };
                        if in_range {
                            events.push(event);
                        }
                        if events.len() >= page_size {
                            let next = ChangeFeedCursor {
                                cursor_version: CURSOR_VERSION,
                                url_host: self.host(),
                                start_time,
                                end_time,
                                segment_path: segment_path.clone(),
                                shard_index,
                                chunk_path: chunk.clone(),
                                event_index: index + 1,
                            };
                            return Ok(Page::new(events, Some(serde_json::to_string(&next)?)));
                        }
                    }
                }
            }
        }
        Ok(Page::new(events, None))
    }

    /// Manifest paths of segments in `[start, end)`, oldest first.
    async fn list_segments(
        &self,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let (_, years) = self.list_blobs(SEGMENT_INDEX_PREFIX, Some("/")).await?;
        let mut segments = Vec::new();
        for year_prefix in years {
            let year: Option<i32> = year_prefix
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .and_then(|y| y.parse().ok());
            let Some(year) = year else { continue };
            if start.is_some_and(|s| year < s.year()) || year > end.year() {
                continue;
            }
            let (names, _) = self.list_blobs(&year_prefix, None).await?;
            for name in names {
                if !name.ends_with("meta.json") {
                    continue;
                }
                let Some(t) = segment_time(&name) else { continue };
                if start.is_some_and(|s| t < s) || t >= end {
                    continue;
                }
                segments.push((t, name));
            }
        }
        segments.sort();
        Ok(segments.into_iter().map(|(_, name)| name).collect())
    }

    async fn get_blob(&self, name: &str) -> Result<RawResponse> {
        let url = resource_url(
            &self.account_url,
            &format!("{}/{}", CHANGE_FEED_CONTAINER, name),
        )?;
        self.transport
            .pipeline
            .send(self.transport.pipeline.client().get(url))
            .await
    }

    /// All blob names (and, with a delimiter, prefixes) under `prefix`.
    async fn list_blobs(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut names = Vec::new();
        let mut prefixes = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut url = resource_url(&self.account_url, CHANGE_FEED_CONTAINER)?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("restype", "container")
                    .append_pair("comp", "list")
                    .append_pair("prefix", prefix);
                if let Some(d) = delimiter {
                    query.append_pair("delimiter", d);
                }
                if let Some(m) = &marker {
                    query.append_pair("marker", m);
                }
            }
            let response = self
                .transport
                .pipeline
                .send(self.transport.pipeline.client().get(url))
                .await?;
            let root = response.xml()?;
            if let Some(blobs) = root.child("Blobs") {
                names.extend(
                    blobs
                        .children_named("Blob")
                        .filter_map(|b| b.child_text("Name"))
                        .map(str::to_string),
                );
                prefixes.extend(
                    blobs
                        .children_named("BlobPrefix")
                        .filter_map(|b| b.child_text("Name"))
                        .map(str::to_string),
                );
            }
            marker = root
                .child_text("NextMarker")
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            if marker.is_none() {
                return Ok((names, prefixes));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::{types::Record, Schema, Writer};

    #[test]
    fn test_segment_time() {
        assert_eq!(
            segment_time("idx/segments/2026/02/23/1800/meta.json"),
            Some(Utc.with_ymd_and_hms(2026, 2, 23, 18, 0, 0).unwrap())
        );
        assert_eq!(segment_time("idx/segments/2026/02/23/meta.json"), None);
        assert_eq!(segment_time("log/00/2026/02/23/1800/0000.avro"), None);
    }

    #[test]
    fn test_floor_and_strip() {
        let t = Utc.with_ymd_and_hms(2026, 2, 23, 18, 42, 7).unwrap();
        assert_eq!(floor_to_hour(t), Utc.with_ymd_and_hms(2026, 2, 23, 18, 0, 0).unwrap());
        assert_eq!(
            strip_container("$blobchangefeed/log/00/2026/02/23/1800/"),
            "log/00/2026/02/23/1800/"
        );
        assert_eq!(strip_container("log/00/"), "log/00/");
    }

    #[test]
    fn test_decode_chunk() {
        let schema = Schema::parse_str(
            r#"{"type":"record","name":"BlobChangeEvent","fields":[
                {"name":"eventType","type":"string"},
                {"name":"eventTime","type":"string"},
                {"name":"subject","type":["null","string"]}]}"#,
        )
        .unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        let mut record = Record::new(&schema).unwrap();
        record.put("eventType", "BlobCreated");
        record.put("eventTime", "2026-02-23T18:10:00.0000000Z");
        record.put(
            "subject",
            apache_avro::types::Value::Union(
                1,
                Box::new(apache_avro::types::Value::String("/blobServices/default/containers/c/blobs/b".into())),
            ),
        );
        writer.append(record).unwrap();
        let bytes = writer.into_inner().unwrap();

        let events = decode_chunk(&bytes).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["eventType"], "BlobCreated");
        assert_eq!(
            events[0]["subject"],
            "/blobServices/default/containers/c/blobs/b"
        );
        assert!(decode_chunk(b"not avro").is_err());
    }

    #[test]
    fn test_cursor_from_other_account_rejected() {
        let client = ChangeFeedClient::new(
            "https://acct.blob.core.windows.net",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap();
        let cursor = ChangeFeedCursor {
            cursor_version: CURSOR_VERSION,
            url_host: "other.blob.core.windows.net".into(),
            start_time: None,
            end_time: None,
            segment_path: "idx/segments/2026/02/23/1800/meta.json".into(),
            shard_index: 0,
            chunk_path: "log/00/2026/02/23/1800/00000.avro".into(),
            event_index: 3,
        };
        let options = ListChangesOptions {
            continuation_token: Some(serde_json::to_string(&cursor).unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            client.list_changes(options),
            Err(Error::InvalidArgument(_))
        ));
        let garbage = ListChangesOptions {
            continuation_token: Some("{".into()),
            ..Default::default()
        };
        assert!(client.list_changes(garbage).is_err());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let client = ChangeFeedClient::new(
            "https://acct.blob.core.windows.net",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap();
        let options = ListChangesOptions {
            start_time: Some(Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap()),
            end_time: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(client.list_changes(options).is_err());
    }
}
