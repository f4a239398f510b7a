//! Platform JSON types. Listings wrap "things"; the discriminator is the `kind` field.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, TransportError};

/// Anything a stream can deliver: it must carry a stable identifier.
pub trait Item: Send + 'static {
    fn item_id(&self) -> &str;
}

/// A submission (kind `t3`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub id: String,
    pub name: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub selftext: String,
    pub domain: String,
    pub score: i64,
    pub ups: i64,
    pub downs: i64,
    pub num_comments: i64,
    pub over_18: bool,
    pub is_self: bool,
    pub stickied: bool,
    #[serde(deserialize_with = "unix_seconds", serialize_with = "to_unix_seconds")]
    pub created_utc: Option<DateTime<Utc>>,
    pub edited: NumBool,
    pub media: Option<Media>,
}

impl Item for Link {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// A comment (kind `t1`). Nested replies are not decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: String,
    pub name: String,
    pub body: String,
    pub author: String,
    pub link_id: String,
    pub parent_id: String,
    pub subreddit: String,
    pub score: i64,
    pub ups: i64,
    pub downs: i64,
    pub stickied: bool,
    #[serde(deserialize_with = "unix_seconds", serialize_with = "to_unix_seconds")]
    pub created_utc: Option<DateTime<Utc>>,
    pub edited: NumBool,
}

impl Item for Comment {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// Embedded media attached to a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Media {
    pub oembed: Oembed,
    #[serde(rename = "type")]
    pub typ: String,
}

/// oEmbed metadata of an embedded media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Oembed {
    pub description: String,
    pub html: String,
    pub height: i64,
    pub provider_name: String,
    pub provider_url: String,
    pub thumbnail_height: i64,
    pub thumbnail_url: String,
    pub thumbnail_width: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub version: String,
    pub width: i64,
}

/// Account details from `/user/{name}/about.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub link_karma: i64,
    pub comment_karma: i64,
    pub is_gold: bool,
    pub is_mod: bool,
    pub verified: bool,
    #[serde(deserialize_with = "unix_seconds", serialize_with = "to_unix_seconds")]
    pub created_utc: Option<DateTime<Utc>>,
}

/// A flag the API reports as either a boolean or a number.
///
/// `edited` is `false` for untouched items and the edit timestamp otherwise.
/// Serializes back to the same shape: the number when set, else the boolean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumBool {
    pub val: bool,
    pub num: f64,
}

impl Serialize for NumBool {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.num != 0.0 {
            serializer.serialize_f64(self.num)
        } else {
            serializer.serialize_bool(self.val)
        }
    }
}

impl<'de> Deserialize<'de> for NumBool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let text = match &value {
            serde_json::Value::Bool(b) => return Ok(NumBool { val: *b, num: 0.0 }),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.to_lowercase(),
            serde_json::Value::Null => return Ok(NumBool::default()),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected bool or number, got {}",
                    other
                )))
            }
        };
        match text.as_str() {
            "true" => Ok(NumBool { val: true, num: 0.0 }),
            "false" => Ok(NumBool { val: false, num: 0.0 }),
            s => {
                let num: f64 = s.parse().map_err(serde::de::Error::custom)?;
                Ok(NumBool { val: num > 0.0, num })
            }
        }
    }
}

/// Float Unix seconds, truncated to whole seconds.
fn unix_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    let secs: Option<f64> = Option::deserialize(deserializer)?;
    Ok(secs.and_then(|s| Utc.timestamp_opt(s as i64, 0).single()))
}

fn to_unix_seconds<S: Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(at) => serializer.serialize_some(&(at.timestamp() as f64)),
        None => serializer.serialize_none(),
    }
}

/// One child of a listing.
#[derive(Debug, Clone)]
pub enum Thing {
    Comment(Comment),
    Link(Link),
    /// Placeholder for collapsed comments.
    More,
    Other(String),
}

impl Thing {
    pub fn from_json(value: &serde_json::Value) -> std::result::Result<Self, String> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or("missing kind")?;
        let data = value.get("data").cloned().unwrap_or_default();
        match kind {
            "t1" => serde_json::from_value(data)
                .map(Thing::Comment)
                .map_err(|e| e.to_string()),
            "t3" => serde_json::from_value(data)
                .map(Thing::Link)
                .map_err(|e| e.to_string()),
            "more" => Ok(Thing::More),
            other => Ok(Thing::Other(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ListingData {
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Listing {
    data: ListingData,
}

fn things(value: &serde_json::Value) -> Result<Vec<Thing>> {
    let listing: Listing = serde_json::from_value(value.clone())?;
    listing
        .data
        .children
        .iter()
        .map(|child| Thing::from_json(child).map_err(TransportError::Decode))
        .collect()
}

/// Links of a listing, in listing order.
pub fn links_from_listing(value: &serde_json::Value) -> Result<Vec<Link>> {
    Ok(things(value)?
        .into_iter()
        .filter_map(|thing| match thing {
            Thing::Link(link) => Some(link),
            _ => None,
        })
        .collect())
}

/// Top-level comments of a `/comments/{id}.json` response.
///
/// The response is a pair of listings: the link itself, then its comments.
pub fn comments_from_thread(value: &serde_json::Value) -> Result<Vec<Comment>> {
    let listing = value
        .as_array()
        .and_then(|pair| pair.get(1))
        .ok_or_else(|| TransportError::Decode("expected [link, comments] listings".into()))?;
    Ok(things(listing)?
        .into_iter()
        .filter_map(|thing| match thing {
            Thing::Comment(comment) => Some(comment),
            _ => None,
        })
        .collect())
}
