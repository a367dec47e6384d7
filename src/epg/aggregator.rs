//! Per-day EPG fetching, normalization and deduplication

use std::collections::HashSet;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::{null_as_default, optional_string_or_number, ApiClient, Method, Transport};
use crate::error::{ApiError, EpgFetchError};
use crate::models::{guide_id, Channel, Genre, Guide, GuideChannel, ProgramEntry};

/// One day of guide data and the bounds used to query it.
///
/// The query starts at 23:00 UTC of the previous day, so neighbouring windows
/// overlap and return some programs twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

/// Windows for offsets `-days_back .. days`, ascending.
pub fn day_windows(today: NaiveDate, days_back: u32, days: u32) -> Vec<DayWindow> {
    (-i64::from(days_back)..i64::from(days))
        .map(|offset| {
            let day = today + Duration::days(offset);
            DayWindow {
                day,
                date_from: day - Duration::days(1),
                date_to: day,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct EpgResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<ProgramBlock>,
}

/// Programs of one channel as returned by the EPG endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub programs: Vec<RawProgram>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProgram {
    pub channel: RawChannelRef,
    pub start_time: String,
    pub end_time: String,
    pub program: RawProgramInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawChannelRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProgramInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub program_value: ProgramValue,
    #[serde(default)]
    pub program_category: Option<ProgramCategory>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramValue {
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub creation_year: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub episode_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramCategory {
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sub_categories: Vec<SubCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubCategory {
    #[serde(default, deserialize_with = "null_as_default")]
    pub desc: String,
}

/// Query one window for the given channels.
pub fn fetch_window<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
    channel_ids: &[i64],
    date_from: NaiveDate,
    date_to: NaiveDate,
    limit: usize,
) -> Result<Vec<ProgramBlock>, ApiError> {
    let ids = channel_ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let filter = format!(
        "channel.id=in=({});endTime=ge={}T23:00:00.000Z;startTime=le={}T23:59:59.999Z",
        ids,
        date_from.format("%Y-%m-%d"),
        date_to.format("%Y-%m-%d"),
    );
    let request = client
        .request(Method::Get, "/v2/television/epg")
        .bearer(access_token)
        .query("filter", filter)
        .query("limit", limit)
        .query("offset", 0)
        .query("lang", client.market().api_language());
    let response: EpgResponse = client.fetch_json(&request)?;
    Ok(response.items)
}

/// Map provider records to [`ProgramEntry`], stamping each time with the
/// offset `tz` has at that instant. Records with unreadable timestamps are
/// dropped.
pub fn normalize<Tz: TimeZone>(blocks: &[ProgramBlock], tz: &Tz) -> Vec<ProgramEntry> {
    let mut entries = Vec::new();
    for raw in blocks.iter().flat_map(|b| &b.programs) {
        let (Some(start), Some(stop)) = (
            parse_timestamp(&raw.start_time, tz),
            parse_timestamp(&raw.end_time, tz),
        ) else {
            warn!(
                channel = %raw.channel.name,
                start = %raw.start_time,
                stop = %raw.end_time,
                "skipping program with unreadable time"
            );
            continue;
        };

        let info = &raw.program;
        let mut title = info.title.clone().unwrap_or_default();
        if let Some(episode) = &info.program_value.episode_id {
            title = format!("{} ({})", title, episode);
        }

        let genre = info.program_category.as_ref().and_then(|category| {
            category.sub_categories.first().map(|sub| Genre {
                genre: category.desc.clone().unwrap_or_default(),
                subgenre: sub.desc.clone(),
            })
        });

        entries.push(ProgramEntry {
            channel_guide_id: guide_id(raw.channel.id, &raw.channel.name),
            start,
            stop,
            title,
            description: info.description.clone().unwrap_or_default(),
            year: info.program_value.creation_year.clone(),
            genre,
            icon: info.images.first().cloned(),
        });
    }
    entries
}

/// Drop exact duplicates, keeping first-seen order.
pub fn aggregate(entries: impl IntoIterator<Item = ProgramEntry>) -> Vec<ProgramEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

/// Fetch every window in order. Any failed day aborts the whole guide.
pub fn fetch_guide<T: Transport, Tz: TimeZone>(
    client: &ApiClient<T>,
    access_token: &str,
    channels: &[Channel],
    windows: &[DayWindow],
    tz: &Tz,
) -> Result<Vec<ProgramEntry>, EpgFetchError> {
    if channels.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = channels.iter().map(|c| c.id).collect();
    let mut collected = Vec::new();
    for window in windows {
        let blocks = fetch_window(
            client,
            access_token,
            &ids,
            window.date_from,
            window.date_to,
            ids.len(),
        )
        .map_err(|source| EpgFetchError {
            day: window.day,
            source,
        })?;
        let entries = normalize(&blocks, tz);
        info!(day = %window.day.format("%d.%m.%Y"), programs = entries.len(), "EPG day fetched");
        collected.extend(entries);
    }
    Ok(aggregate(collected))
}

pub fn build_guide(channels: &[Channel], programs: Vec<ProgramEntry>) -> Guide {
    Guide {
        channels: channels.iter().map(GuideChannel::from).collect(),
        programs,
    }
}

/// RFC 3339 values are converted into `tz`; values without a zone are taken
/// as wall time in `tz`. Times inside a DST gap are unreadable.
fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(tz).fixed_offset());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()?
        .and_local_timezone(tz.clone())
        .earliest()
        .map(|dt| dt.fixed_offset())
}
