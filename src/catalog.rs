use scraper::Html;
use scraper::Selector;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::errors::AihlError;

/// Everything on the site is hockey; the genre tag is fixed.
const GENRE: &str = "Sport";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub thumb: String,
    pub page_url: String,
    pub genre: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Round {
    pub label: String,
    pub events: Vec<Event>,
}

/// Parse the homepage into rounds of events, preserving page order.
///
/// A rail missing its caption or an item missing its anchor/image markup is
/// skipped, the rest of the page still parses. Only a page with no rail
/// containers at all is treated as a layout change and fails outright.
pub fn parse_catalog(html: &str, base: &Url) -> Result<Vec<Round>, AihlError> {
    // <div class="generic-rail">
    //     <div class="generic-rail--caption"><h4>Round 3 Replays</h4></div>
    //     <div class="generic-rail-item">
    //         <a href="/ice-hockey/aihl/round-3/28-april-rd-3-mustangs-v-ice/">
    //             <img src="https://cdn.aihl.tv/thumbs/rd3.jpg" alt="28 April Rd 3 Mustangs v Ice">
    //         </a>
    //     </div>
    // </div>
    let document = Html::parse_document(html);
    let rail_selector = Selector::parse("div.generic-rail").unwrap();
    let caption_selector = Selector::parse("div.generic-rail--caption h4").unwrap();
    let item_selector = Selector::parse("div.generic-rail-item").unwrap();
    let anchor_selector = Selector::parse("a").unwrap();
    let image_selector = Selector::parse("img").unwrap();

    let mut rounds = Vec::new();
    let mut saw_rail = false;
    for rail in document.select(&rail_selector) {
        saw_rail = true;

        let label = rail
            .select(&caption_selector)
            .next()
            .map(|h4| h4.text().collect::<String>().trim().to_string())
            .filter(|label| !label.is_empty());
        let Some(label) = label else {
            log::warn!("skipping rail without a caption");
            continue;
        };

        let mut events = Vec::new();
        for item in rail.select(&item_selector) {
            let href = item
                .select(&anchor_selector)
                .next()
                .and_then(|a| a.value().attr("href"));
            let image = item.select(&image_selector).next();
            let (Some(href), Some(image)) = (href, image) else {
                log::warn!("skipping malformed item in rail {label:?}");
                continue;
            };
            let page_url = match base.join(href) {
                Ok(url) => url,
                Err(err) => {
                    log::warn!("skipping item with bad href {href:?}: {err}");
                    continue;
                }
            };

            events.push(Event {
                name: image.value().attr("alt").unwrap_or_default().to_string(),
                thumb: image.value().attr("src").unwrap_or_default().to_string(),
                page_url: page_url.to_string(),
                genre: GENRE.to_string(),
            });
        }
        rounds.push(Round { label, events });
    }

    if !saw_rail {
        return Err(AihlError::Parse {
            reason: "no rail containers in page".to_string(),
        });
    }
    Ok(rounds)
}
