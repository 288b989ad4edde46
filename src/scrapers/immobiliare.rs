//! Immobiliare.it scraper.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::scrapers::{ApifyClient, ListingScraper, Provider, ScrapeError, ScrapeResult};
use crate::utils::json::{
    as_f64_lenient, first_truthy, get, get_path, is_truthy, object_or_empty, value_to_text,
};

const EMPTY_MESSAGE: &str = "Immobiliare scraper returned no data. Verify the listing is public.";

/// Media collections scanned for photo URLs, best quality first.
const MEDIA_KEYS: [&str; 4] = ["imgs_hd", "imgs_b", "images", "gallery"];

/// Scrapes single Immobiliare.it listings with a synchronous actor run.
#[derive(Debug, Clone)]
pub struct ImmobiliareScraper {
    client: ApifyClient,
    actor_id: String,
}

impl ImmobiliareScraper {
    pub fn new(client: ApifyClient, actor_id: impl Into<String>) -> Self {
        Self {
            client,
            actor_id: actor_id.into(),
        }
    }

    /// Drops the English path segment and trailing `?`/`&`.
    pub fn normalize_url(url: &str) -> String {
        url.trim()
            .replace("immobiliare.it/en/", "immobiliare.it/")
            .trim_end_matches(['?', '&'])
            .to_string()
    }

    pub fn prepare_payload(url: &str) -> Value {
        json!({
            "startUrls": [url],
            "maxConcurrency": 10,
            "minConcurrency": 1,
            "maxRequestRetries": 100,
            "proxyConfiguration": {"useApifyProxy": true},
        })
    }

    /// Reshapes an actor record into the fields the normalizer reads.
    pub fn process_result(raw: &Value) -> Value {
        if get(raw, "dataType").and_then(Value::as_str) == Some("agency") {
            let mut processed = object_or_empty(Some(raw));
            processed.insert("source".to_string(), json!(Provider::Immobiliare.as_str()));
            if !processed.contains_key("listingUrl") {
                let url = processed.get("url").cloned().unwrap_or(Value::Null);
                processed.insert("listingUrl".to_string(), url);
            }
            return Value::Object(processed);
        }

        let basic = Value::Object(object_or_empty(get(raw, "basicInfo")));

        let listing_url = first_truthy([
            get(raw, "url"),
            get(raw, "detailUrl"),
            get(raw, "canonicalUrl"),
            get_path(&basic, &["analytics", "shareUrl"]),
        ]);

        let media = first_truthy([get(raw, "media"), get(&basic, "media")]);
        let photos = media.map(collect_media_urls).unwrap_or_default();

        let first_cost = get(raw, "infoCosti")
            .and_then(Value::as_array)
            .and_then(|costs| costs.first());
        let price = first_truthy([get(raw, "price"), get(&basic, "price"), first_cost])
            .map_or_else(|| json!({"formatted": null, "amount": null, "currency": null}), process_price);

        let analytics = first_truthy([get(raw, "analytics"), get(&basic, "analytics")]);
        let geography = get(&basic, "geography");
        let geo = |path: &[&str]| geo_field(geography, path);

        let location = json!({
            "address": first_truthy([get(raw, "addr"), geo(&["street"])]),
            "city": first_truthy([get(raw, "c"), geo(&["municipality", "name"])]),
            "state": first_truthy([get(raw, "region"), geo(&["province", "name"])]),
            "country": first_truthy([
                analytics.and_then(|a| get(a, "country")),
                geo(&["municipality", "country"]),
            ]),
            "coordinates": {
                "lat": first_truthy([geo(&["geolocation", "latitude"]), get(raw, "lt")])
                    .and_then(as_f64_lenient),
                "lng": first_truthy([geo(&["geolocation", "longitude"]), get(raw, "ln")])
                    .and_then(as_f64_lenient),
            },
            "listingUrl": listing_url,
        });

        let rooms = first_truthy([
            get_path(&basic, &["topology", "rooms"]),
            get(&basic, "rooms"),
            get(raw, "rooms"),
            get(raw, "s"),
        ])
        .and_then(safe_int);
        let bathrooms = first_truthy([
            get_path(&basic, &["topology", "bathrooms"]),
            get(raw, "bathrooms"),
            get(raw, "bagni"),
        ])
        .and_then(safe_int);

        let title = first_truthy([
            get_path(raw, &["meta", "title"]),
            get_path(&basic, &["meta", "title"]),
            get(raw, "title"),
            get(raw, "t"),
        ]);
        let description = first_truthy([get(raw, "desc"), get(&basic, "description")]);

        let agency = Value::Object(object_or_empty(first_truthy([
            get(raw, "agencyDetail"),
            get(&basic, "contacts"),
        ])));

        json!({
            "source": Provider::Immobiliare.as_str(),
            "title": title,
            "description": description,
            "price": price,
            "rooms": rooms,
            "bathrooms": bathrooms,
            "amenities": collect_amenities(raw, analytics),
            "location": location,
            "photos": photos,
            "office": process_office(&agency),
        })
    }
}

fn geo_field<'a>(geography: Option<&'a Value>, path: &[&str]) -> Option<&'a Value> {
    geography.and_then(|g| get_path(g, path))
}

fn collect_media_urls(media: &Value) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        if !url.is_empty() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    };

    for key in MEDIA_KEYS {
        let Some(Value::Array(values)) = get(media, key) else {
            continue;
        };
        for value in values {
            match value {
                Value::Object(_) => {
                    for field in ["url", "src", "hd", "sd"] {
                        if let Some(url) = get(value, field).and_then(Value::as_str) {
                            push(url);
                        }
                    }
                }
                Value::String(url) => push(url),
                _ => {}
            }
        }
    }

    if let Some(placeholder) = get(media, "placeholder").and_then(Value::as_str) {
        push(placeholder);
    }

    urls
}

fn process_price(node: &Value) -> Value {
    match node {
        Value::Object(_) => {
            let formatted = first_truthy([
                get(node, "formatted"),
                get(node, "value"),
                get(node, "text"),
                get(node, "label"),
            ]);
            let amount = first_truthy([get(node, "amount"), get(node, "raw"), get(node, "value")])
                .and_then(as_f64_lenient);
            let currency = get(node, "currency")
                .filter(|c| is_truthy(c))
                .cloned()
                .unwrap_or_else(|| json!("€"));
            json!({"formatted": formatted, "amount": amount, "currency": currency})
        }
        Value::Number(n) => {
            let amount = n.as_f64();
            json!({
                "formatted": amount.map(format_euro),
                "amount": amount,
                "currency": "€",
            })
        }
        Value::String(s) => json!({"formatted": s, "amount": null, "currency": null}),
        _ => json!({"formatted": null, "amount": null, "currency": null}),
    }
}

/// Formats an amount the Italian way: `€ 1.250.000`.
#[allow(clippy::cast_possible_truncation)]
fn format_euro(amount: f64) -> String {
    let digits = (amount.round() as i64).unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("€ {sign}{grouped}")
}

/// Integer from a number, or from the digits of a string such as `"3+"`.
#[allow(clippy::cast_possible_truncation)]
fn safe_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn collect_amenities(raw: &Value, analytics: Option<&Value>) -> Vec<String> {
    let mut features: Vec<String> = analytics
        .and_then(|a| get(a, "otherFeatures"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|i| is_truthy(i))
                .filter_map(value_to_text)
                .collect()
        })
        .unwrap_or_default();

    for key in ["datiPrincipali", "infoCosti"] {
        let Some(Value::Array(items)) = get(raw, key) else {
            continue;
        };
        for item in items {
            let label = get(item, "label").filter(|v| is_truthy(v)).and_then(value_to_text);
            let value = get(item, "value").filter(|v| is_truthy(v)).and_then(value_to_text);
            if let (Some(label), Some(value)) = (label, value) {
                features.push(format!("{label}: {value}"));
            }
        }
    }

    let mut amenities: Vec<String> = Vec::with_capacity(features.len());
    for feature in features {
        let trimmed = feature.trim();
        if !trimmed.is_empty() && !amenities.iter().any(|a| a == trimmed) {
            amenities.push(trimmed.to_string());
        }
    }
    amenities
}

fn process_office(agency: &Value) -> Value {
    let phone = match get(agency, "phones").and_then(Value::as_array) {
        Some(phones) if phones.first().is_some_and(Value::is_object) => {
            first_truthy([get(&phones[0], "num"), get(&phones[0], "value")]).cloned()
        }
        _ => first_truthy([get(agency, "telefono1"), get(agency, "telefono")]).cloned(),
    };

    json!({
        "name": first_truthy([get(agency, "agencyName"), get(agency, "nome"), get(agency, "name")]),
        "phone": phone,
        "email": get(agency, "email"),
        "logo": first_truthy([get(agency, "lag"), get(agency, "logo")]),
        "url": first_truthy([get(agency, "web"), get(agency, "website"), get(agency, "agencyUrl")]),
    })
}

#[async_trait]
impl ListingScraper for ImmobiliareScraper {
    fn provider(&self) -> Provider {
        Provider::Immobiliare
    }

    fn validate_url(&self, url: &str) -> bool {
        url.contains("immobiliare.it")
    }

    async fn scrape(&self, url: &str) -> ScrapeResult<Vec<Value>> {
        let url = Self::normalize_url(url);
        if !self.validate_url(&url) {
            return Err(ScrapeError::InvalidUrl(
                "Invalid URL. Provide a valid Immobiliare property URL.".to_string(),
            ));
        }

        let payload = Self::prepare_payload(&url);
        tracing::info!(url = %url, actor = %self.actor_id, "Calling Immobiliare actor");

        let raw = match self.client.run_sync(&self.actor_id, &payload).await? {
            Value::Array(mut items) => {
                if items.is_empty() {
                    tracing::warn!(url = %url, "Immobiliare dataset empty");
                    return Err(ScrapeError::Empty(EMPTY_MESSAGE.to_string()));
                }
                items.swap_remove(0)
            }
            other => other,
        };

        if !is_truthy(&raw) {
            return Err(ScrapeError::Empty(EMPTY_MESSAGE.to_string()));
        }

        Ok(vec![Self::process_result(&raw)])
    }
}
