use regex::Regex;
use scraper::Html;
use scraper::Selector;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::errors::AihlError;

const MEDIA_ID_TOKEN: &str = "jwMediaId";
const MEDIA_API_BASE: &str = "https://cdn.jwplayer.com/v2/media";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StreamSource {
    pub url: String,
    pub title: Option<String>,
}

/// Find the JW Player media id embedded in one of the event page's script
/// blocks.
pub fn extract_media_id(html: &str) -> Result<String, AihlError> {
    // jwplayer("player").setup({ jwMediaId: "AbC123xY", ... });
    let pattern = Regex::new(r#"jwMediaId:\s*"([^"]*)""#).unwrap();
    let document = Html::parse_document(html);
    let script_selector = Selector::parse("script").unwrap();

    for script in document.select(&script_selector) {
        let text = script.text().collect::<String>();
        if !text.contains(MEDIA_ID_TOKEN) {
            continue;
        }
        if let Some(captures) = pattern.captures(&text) {
            return Ok(captures[1].to_string());
        }
    }
    Err(AihlError::Parse {
        reason: "media id not found".to_string(),
    })
}

pub fn descriptor_url(media_id: &str) -> String {
    format!("{MEDIA_API_BASE}/{media_id}")
}

/// Pull the playable file out of a JW Player media descriptor:
/// `{"playlist": [{"sources": [{"file": "..."}], "description": "..."}]}`.
pub fn parse_stream_source(body: &str) -> Result<StreamSource, AihlError> {
    let descriptor: Value = serde_json::from_str(body).map_err(|_| malformed())?;
    let entry = descriptor
        .get("playlist")
        .and_then(Value::as_array)
        .and_then(|playlist| playlist.first())
        .ok_or_else(malformed)?;
    let file = entry
        .get("sources")
        .and_then(Value::as_array)
        .and_then(|sources| sources.first())
        .and_then(|source| source.get("file"))
        .and_then(Value::as_str)
        .ok_or_else(malformed)?;
    let title = entry
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(StreamSource {
        url: file.to_string(),
        title,
    })
}

fn malformed() -> AihlError {
    AihlError::Media {
        reason: "malformed media descriptor".to_string(),
    }
}
