//! Live channel catalog and category mapping

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::{null_as_default, ApiClient, Method, Transport};
use crate::error::ApiError;
use crate::models::Channel;

/// Channel id -> category name
pub type CategoryMap = HashMap<i64, String>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelInfo {
    channel_id: i64,
    name: String,
    #[serde(default)]
    logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    channel: ChannelInfo,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryChannel {
    channel_id: i64,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    channels: Vec<CategoryChannel>,
}

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    categories: Vec<Category>,
}

/// Fetch the live channels and their categories.
///
/// `allow_list` keeps only the given channel ids; `None` keeps everything.
/// Channels missing from the category listing get `category: None`.
pub fn list_live_channels<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
    allow_list: Option<&HashSet<i64>>,
) -> Result<(Vec<Channel>, CategoryMap), ApiError> {
    let request = client
        .request(Method::Get, "/v2/television/channels")
        .bearer(access_token)
        .query("list", "LIVE")
        .query("queryScope", "LIVE");
    let listing: ChannelListResponse = client.fetch_json(&request)?;

    let categories = fetch_categories(client, access_token)?;

    let mut seen = HashSet::new();
    let channels: Vec<Channel> = listing
        .items
        .into_iter()
        .map(|item| item.channel)
        .filter(|c| allow_list.is_none_or(|ids| ids.contains(&c.channel_id)))
        .filter(|c| seen.insert(c.channel_id))
        .map(|c| {
            let category = categories.get(&c.channel_id).cloned();
            if category.is_none() {
                warn!(channel = %c.name, id = c.channel_id, "channel has no category");
            }
            Channel {
                id: c.channel_id,
                name: c.name,
                logo_url: c.logo_url.unwrap_or_default(),
                category,
            }
        })
        .collect();

    debug!(count = channels.len(), "live channels loaded");
    Ok((channels, categories))
}

fn fetch_categories<T: Transport>(
    client: &ApiClient<T>,
    access_token: &str,
) -> Result<CategoryMap, ApiError> {
    let request = client
        .request(Method::Get, "/home/categories")
        .bearer(access_token)
        .query("language", client.market().code());
    let response: CategoryResponse = client.fetch_json(&request)?;

    let mut map = CategoryMap::new();
    for category in response.categories {
        for channel in category.channels {
            map.insert(channel.channel_id, category.name.clone());
        }
    }
    Ok(map)
}

/// Parse a comma separated id list ("1,2, 3"). Blank input means no filter.
pub fn parse_allow_list(ids: &str) -> Result<Option<HashSet<i64>>, std::num::ParseIntError> {
    let set = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<HashSet<i64>, _>>()?;
    Ok((!set.is_empty()).then_some(set))
}
