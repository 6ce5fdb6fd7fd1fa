//! Normalization boundary for upstream catalog payloads.
//!
//! Upstreams loosely follow one convention but disagree on details: several
//! numeric codes mean success, numbers sometimes arrive as strings, and most
//! fields are optional. Everything shape-dependent lives here; the rest of
//! the crate only sees [`VideoRecord`].

use serde::Deserialize;

use crate::errors::FetchError;
use crate::types::VideoRecord;

/// Payload codes that mean success.
pub const SUCCESS_CODES: &[i64] = &[1, 200];

/// Number that may be encoded as a JSON number or string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Lenient {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Lenient::Int(value) => Some(*value),
            Lenient::Float(value) => Some(*value as i64),
            Lenient::Text(text) => text.trim().parse().ok(),
        }
    }

    fn into_text(self) -> String {
        match self {
            Lenient::Int(value) => value.to_string(),
            Lenient::Float(value) => value.to_string(),
            Lenient::Text(text) => text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    code: Option<Lenient>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    pagecount: Option<Lenient>,
    #[serde(default)]
    list: Option<Vec<RawVideo>>,
}

#[derive(Debug, Deserialize)]
struct RawVideo {
    #[serde(default)]
    vod_id: Option<Lenient>,
    #[serde(default)]
    vod_name: Option<String>,
    #[serde(default)]
    vod_pic: Option<String>,
    #[serde(default)]
    vod_remarks: Option<String>,
    #[serde(default)]
    vod_year: Option<Lenient>,
    #[serde(default)]
    vod_area: Option<String>,
    #[serde(default)]
    vod_actor: Option<String>,
    #[serde(default)]
    vod_director: Option<String>,
    #[serde(default)]
    vod_content: Option<String>,
    #[serde(default)]
    vod_lang: Option<String>,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    vod_play_from: Option<String>,
    #[serde(default)]
    vod_play_url: Option<String>,
}

/// One normalized search page.
#[derive(Debug, Clone)]
pub struct NormalizedPage {
    /// Well-formed records; entries without id or title are dropped
    pub videos: Vec<VideoRecord>,
    /// Page count reported by the upstream, at least 1
    pub page_count: u32,
}

/// Normalized detail payload, before play group selection.
#[derive(Debug, Clone)]
pub struct DetailPayload {
    pub video: VideoRecord,
    /// `$$$`-delimited play group codes
    pub play_from: String,
    /// `$$$`-delimited play groups matching `play_from`
    pub play_url: String,
}

/// Normalizes a search response body.
///
/// # Errors
///
/// - `FetchError::Parse` - Body is not a recognizable payload
/// - `FetchError::Upstream` - Payload carries a non-success code
pub fn normalize_search(
    source_id: &str,
    body: &[u8],
    latency_ms: u64,
) -> Result<NormalizedPage, FetchError> {
    let response = parse_response(source_id, body)?;
    let page_count = response
        .pagecount
        .as_ref()
        .and_then(Lenient::as_i64)
        .unwrap_or(1)
        .clamp(1, i64::from(u32::MAX)) as u32;

    let raw_count = response.list.as_ref().map_or(0, Vec::len);
    let videos: Vec<VideoRecord> = response
        .list
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| into_record(raw, source_id, latency_ms).map(|(video, _, _)| video))
        .collect();

    if videos.len() < raw_count {
        tracing::debug!(
            source = source_id,
            dropped = raw_count - videos.len(),
            "Dropped entries without id or title"
        );
    }

    Ok(NormalizedPage { videos, page_count })
}

/// Normalizes a detail response body, picking the entry for `video_id`.
///
/// Returns `Ok(None)` when the upstream has no such entry.
///
/// # Errors
///
/// - `FetchError::Parse` - Body is not a recognizable payload
/// - `FetchError::Upstream` - Payload carries a non-success code
pub fn normalize_detail(
    source_id: &str,
    video_id: &str,
    body: &[u8],
    latency_ms: u64,
) -> Result<Option<DetailPayload>, FetchError> {
    let response = parse_response(source_id, body)?;

    let mut entries: Vec<(VideoRecord, String, String)> = response
        .list
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| into_record(raw, source_id, latency_ms))
        .collect();

    let Some(position) = entries
        .iter()
        .position(|(video, _, _)| video.id == video_id)
    else {
        if !entries.is_empty() {
            tracing::debug!(
                source = source_id,
                video_id,
                returned = entries.len(),
                "Detail payload has no entry for requested id"
            );
        }
        return Ok(None);
    };

    let (video, play_from, play_url) = entries.swap_remove(position);
    Ok(Some(DetailPayload {
        video,
        play_from,
        play_url,
    }))
}

fn parse_response(source_id: &str, body: &[u8]) -> Result<RawResponse, FetchError> {
    let response: RawResponse = serde_json::from_slice(body).map_err(|e| FetchError::Parse {
        source_id: source_id.to_string(),
        reason: e.to_string(),
    })?;

    match response.code.as_ref().map(|code| code.as_i64()) {
        Some(Some(code)) if SUCCESS_CODES.contains(&code) => {}
        Some(code) => {
            return Err(FetchError::Upstream {
                source_id: source_id.to_string(),
                code: code.unwrap_or(-1),
                message: response.msg.clone().unwrap_or_default(),
            });
        }
        None if response.list.is_none() => {
            return Err(FetchError::Parse {
                source_id: source_id.to_string(),
                reason: "payload has neither code nor list".to_string(),
            });
        }
        None => {}
    }

    Ok(response)
}

fn into_record(
    raw: RawVideo,
    source_id: &str,
    latency_ms: u64,
) -> Option<(VideoRecord, String, String)> {
    let id = raw.vod_id.map(Lenient::into_text).and_then(non_empty)?;
    let title = raw.vod_name.and_then(non_empty)?;

    let video = VideoRecord {
        id,
        title,
        picture: raw.vod_pic.and_then(non_empty),
        remarks: raw.vod_remarks.and_then(non_empty),
        year: raw
            .vod_year
            .map(Lenient::into_text)
            .and_then(non_empty)
            .filter(|year| year != "0"),
        area: raw.vod_area.and_then(non_empty),
        actor: raw.vod_actor.and_then(non_empty),
        director: raw.vod_director.and_then(non_empty),
        synopsis: raw.vod_content.map(|text| strip_markup(&text)).and_then(non_empty),
        language: raw.vod_lang.and_then(non_empty),
        type_name: raw.type_name.and_then(non_empty),
        source: source_id.to_string(),
        latency: latency_ms,
    };

    Some((
        video,
        raw.vod_play_from.unwrap_or_default(),
        raw.vod_play_url.unwrap_or_default(),
    ))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

/// Drops HTML tags and collapses whitespace in synopsis text.
fn strip_markup(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                plain.push(' ');
            }
            _ if !in_tag => plain.push(ch),
            _ => {}
        }
    }
    plain
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
