//! National Weather Service tools: `get_alerts` and `get_forecast`.

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const NWS_API_BASE: &str = "https://api.weather.gov";
const USER_AGENT: &str = "weather-app/1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FORECAST_PERIODS: usize = 5;
const SEPARATOR: &str = "\n---\n";

pub const ALERTS_UNAVAILABLE: &str = "Unable to fetch alerts or no alerts found.";
pub const NO_ACTIVE_ALERTS: &str = "No active alerts for this state.";
pub const POINTS_UNAVAILABLE: &str = "Unable to fetch forecast data for this location.";
pub const FORECAST_UNAVAILABLE: &str = "Unable to fetch detailed forecast.";

/// Client for the NWS API.
#[derive(Debug, Clone)]
pub struct NwsClient {
    client: Client,
    base_url: String,
}

impl NwsClient {
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/geo+json"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Active alerts for a two-letter state code.
    pub async fn alerts(&self, state: &str) -> String {
        let url = format!("{}/alerts/active/area/{state}", self.base_url);
        format_alerts(self.get_json(&url).await.as_ref())
    }

    /// The next forecast periods for a location.
    pub async fn forecast(&self, latitude: f64, longitude: f64) -> String {
        let points_url = format!("{}/points/{latitude},{longitude}", self.base_url);
        let Some(points) = self.get_json(&points_url).await else {
            return POINTS_UNAVAILABLE.to_string();
        };
        let Some(forecast_url) = points["properties"]["forecast"].as_str() else {
            warn!(url = %points_url, "points response has no forecast URL");
            return POINTS_UNAVAILABLE.to_string();
        };

        match self.get_json(forecast_url).await {
            Some(forecast) => format_forecast(&forecast),
            None => FORECAST_UNAVAILABLE.to_string(),
        }
    }

    /// GET a JSON document. Any failure is logged and reported as `None`.
    async fn get_json(&self, url: &str) -> Option<Value> {
        debug!(%url, "requesting NWS data");
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "NWS request failed");
                return None;
            }
        };
        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "NWS returned an error status");
                return None;
            }
        };
        match response.json().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%url, error = %e, "NWS returned malformed JSON");
                None
            }
        }
    }
}

pub fn format_alerts(data: Option<&Value>) -> String {
    let Some(features) = data.and_then(|d| d.get("features")) else {
        return ALERTS_UNAVAILABLE.to_string();
    };
    let Some(features) = features.as_array() else {
        return ALERTS_UNAVAILABLE.to_string();
    };
    if features.is_empty() {
        return NO_ACTIVE_ALERTS.to_string();
    }

    features
        .iter()
        .map(format_alert)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

fn format_alert(feature: &Value) -> String {
    let props = &feature["properties"];
    format!(
        "\nEvent: {}\nArea: {}\nSeverity: {}\nDescription: {}\nInstructions: {}\n",
        field(props, "event", "Unknown"),
        field(props, "areaDesc", "Unknown"),
        field(props, "severity", "Unknown"),
        field(props, "description", "No description available"),
        field(props, "instruction", "No specific instructions provided"),
    )
}

pub fn format_forecast(data: &Value) -> String {
    let Some(periods) = data["properties"]["periods"].as_array() else {
        return FORECAST_UNAVAILABLE.to_string();
    };

    periods
        .iter()
        .take(FORECAST_PERIODS)
        .map(|period| {
            format!(
                "\n{}:\nTemperature: {}°{}\nWind: {} {}\nForecast: {}\n",
                field(period, "name", ""),
                field(period, "temperature", ""),
                field(period, "temperatureUnit", ""),
                field(period, "windSpeed", ""),
                field(period, "windDirection", ""),
                field(period, "detailedForecast", ""),
            )
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// A property as display text: strings unquoted, absent or null as `default`.
fn field(object: &Value, key: &str, default: &str) -> String {
    match object.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
