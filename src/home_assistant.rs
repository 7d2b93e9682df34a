// DriftClock Home Assistant Integration
// Polls entity states for weather/darkness and publishes the clock's alarm state

use chrono::{DateTime, Local};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::HomeAssistantConfig;
use crate::error::{ClockError, Result};
use crate::util::title_case;

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Every published entity is re-sent at least this often.
pub const RESEND_INTERVAL: Duration = Duration::from_secs(600);

const OPENWEATHERMAP_SENSOR: &str = "sensor.openweathermap_weather";
const SUN_ENTITY: &str = "sun.sun";

// ============ Entities ============

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub state: String,
    pub attributes: HashMap<String, String>,
}

impl Entity {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Render an attribute value as text. Objects, arrays and null have no
/// text form.
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) if n.is_f64() => n.as_f64().map(|f| format!("{:.8}", f)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the reply of `GET api/states`. Entries without an id or state are
/// skipped.
pub fn parse_states(reply: &Value) -> HashMap<String, Entity> {
    let mut entities = HashMap::new();
    let Some(items) = reply.as_array() else {
        return entities;
    };

    for item in items {
        let id = item.get("entity_id").and_then(Value::as_str).unwrap_or("");
        let state = item.get("state").and_then(Value::as_str).unwrap_or("");
        if id.is_empty() || state.is_empty() {
            continue;
        }
        let attributes = item
            .get("attributes")
            .and_then(Value::as_object)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|(k, v)| value_as_string(v).map(|s| (k.clone(), s)))
                    .collect()
            })
            .unwrap_or_default();
        entities.insert(
            id.to_string(),
            Entity {
                state: state.to_string(),
                attributes,
            },
        );
    }
    entities
}

/// What the clock uses from one poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomeAssistantInfo {
    pub weather: Option<String>,
    pub temperature: Option<f64>,
    pub temperature_unit: Option<String>,
    /// `None` when neither the darkness sensor nor `sun.sun` is present.
    pub is_dark: Option<bool>,
}

pub fn extract_info(
    entities: &HashMap<String, Entity>,
    weather_entity: &str,
    darkness_entity: &str,
) -> HomeAssistantInfo {
    let mut info = HomeAssistantInfo::default();

    if let Some(sensor) = entities.get(OPENWEATHERMAP_SENSOR) {
        info.weather = Some(title_case(&sensor.state));
    }
    if let Some(weather) = entities.get(weather_entity) {
        if info.weather.is_none() {
            info.weather = Some(title_case(&weather.state));
        }
        info.temperature = weather
            .attribute("temperature")
            .and_then(|t| t.parse::<f64>().ok());
        info.temperature_unit = weather.attribute("temperature_unit").map(String::from);
    }

    if let Some(sensor) = entities.get(darkness_entity) {
        info.is_dark = Some(sensor.state.eq_ignore_ascii_case("sleep"));
    } else if let Some(sun) = entities.get(SUN_ENTITY) {
        let elevation = sun
            .attribute("elevation")
            .and_then(|e| e.parse::<f64>().ok())
            .unwrap_or(0.0);
        info.is_dark = Some(sun.state == "below_horizon" || elevation < 0.0);
    }
    info
}

// ============ Published state ============

/// Clock state mirrored into Home Assistant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedState {
    pub alarming: bool,
    pub alarm_enabled: bool,
    pub next_alarm: Option<DateTime<Local>>,
}

pub fn format_switch(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// `%FT%T` in local time, `unknown` when nothing is scheduled.
pub fn format_next_alarm(next: Option<DateTime<Local>>) -> String {
    match next {
        Some(t) => t.format("%FT%T").to_string(),
        None => "unknown".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub entity_id: String,
    pub state: String,
}

/// Remembers what was last sent per entity and decides what is due.
#[derive(Debug, Default)]
pub struct SendTracker {
    last_values: HashMap<String, String>,
    last_full_send: Option<Instant>,
}

impl SendTracker {
    /// Updates for entities whose value changed, or all of them when the
    /// resend interval has elapsed.
    pub fn due(
        &self,
        config: &HomeAssistantConfig,
        state: &PublishedState,
        now: Instant,
    ) -> Vec<StateUpdate> {
        let scheduled = self
            .last_full_send
            .map(|t| now.saturating_duration_since(t) >= RESEND_INTERVAL)
            .unwrap_or(true);

        let wanted = [
            (&config.alarming_entity, format_switch(state.alarming).to_string()),
            (
                &config.alarm_enabled_entity,
                format_switch(state.alarm_enabled).to_string(),
            ),
            (&config.next_alarm_entity, format_next_alarm(state.next_alarm)),
        ];

        wanted
            .into_iter()
            .filter_map(|(entity, value)| entity.as_ref().map(|e| (e.clone(), value)))
            .filter(|(entity, value)| {
                scheduled || self.last_values.get(entity).map(|v| v != value).unwrap_or(true)
            })
            .map(|(entity_id, state)| StateUpdate { entity_id, state })
            .collect()
    }

    pub fn record(&mut self, update: &StateUpdate) {
        self.last_values
            .insert(update.entity_id.clone(), update.state.clone());
    }

    /// Mark a round in which every due update was sent.
    pub fn record_round(&mut self, now: Instant) {
        self.last_full_send = Some(now);
    }
}

// ============ Client ============

pub struct HomeAssistantClient {
    http: reqwest::Client,
    config: HomeAssistantConfig,
}

impl HomeAssistantClient {
    pub fn new(config: HomeAssistantConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("driftclock/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { http, config })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClockError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn get_entities(&self) -> Result<HashMap<String, Entity>> {
        let url = self.config.api_url("states")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let reply: Value = Self::check(response).await?.json().await?;
        if !reply.is_array() {
            return Err(ClockError::Parse("api/states did not return a list".into()));
        }
        Ok(parse_states(&reply))
    }

    pub async fn update_state(&self, entity_id: &str, state: &str) -> Result<()> {
        let url = self.config.api_url(&format!("states/{}", entity_id))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.token)
            .json(&json!({ "state": state }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn poll_info(&self) -> Result<HomeAssistantInfo> {
        let entities = self.get_entities().await?;
        Ok(extract_info(
            &entities,
            &self.config.weather_entity,
            &self.config.darkness_entity,
        ))
    }

    async fn publish(&self, tracker: &mut SendTracker, state: &PublishedState) {
        let now = Instant::now();
        let updates = tracker.due(&self.config, state, now);
        if updates.is_empty() {
            return;
        }

        let mut had_error = false;
        for update in &updates {
            match self.update_state(&update.entity_id, &update.state).await {
                Ok(()) => {
                    info!(
                        "Sent Home Assistant {} = {}",
                        update.entity_id, update.state
                    );
                    tracker.record(update);
                }
                Err(e) => {
                    warn!(
                        "Error sending Home Assistant {} = {}: {}",
                        update.entity_id, update.state, e
                    );
                    had_error = true;
                }
            }
        }
        if !had_error {
            tracker.record_round(now);
        }
    }

    /// Poll and publish until `state_rx`'s sender is dropped.
    ///
    /// Readings are delivered on `info_tx`; the loop stops early if its
    /// receiver goes away.
    pub async fn run(
        self,
        mut state_rx: watch::Receiver<PublishedState>,
        info_tx: mpsc::Sender<HomeAssistantInfo>,
    ) {
        let mut tracker = SendTracker::default();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_poll: Option<Instant> = None;

        info!("Home Assistant updater started for {}", self.config.base_url);
        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }

            let state = state_rx.borrow_and_update().clone();
            self.publish(&mut tracker, &state).await;

            let poll_due = last_poll
                .map(|t| t.elapsed() >= POLL_INTERVAL)
                .unwrap_or(true);
            if poll_due {
                last_poll = Some(Instant::now());
                match self.poll_info().await {
                    Ok(info) => {
                        debug!("Home Assistant update: {:?}", info);
                        if info_tx.send(info).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Home Assistant poll failed: {}", e),
                }
            }
        }
        info!("Home Assistant updater stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArgMap;
    use chrono::TimeZone;

    fn states() -> Value {
        json!([
            {
                "entity_id": "weather.openweathermap",
                "state": "partlycloudy",
                "attributes": {
                    "temperature": 21.5,
                    "temperature_unit": "°C",
                    "humidity": 40,
                    "forecast": [1, 2]
                }
            },
            {
                "entity_id": "sun.sun",
                "state": "above_horizon",
                "attributes": {"elevation": 12.3, "rising": true}
            },
            {"entity_id": "sensor.empty", "state": ""},
            {"state": "orphan"}
        ])
    }

    fn ha_config() -> HomeAssistantConfig {
        let mut args = ArgMap::new();
        args.set("home_assistant_url", "http://hass.local:8123");
        args.set("home_assistant_token", "t");
        args.set("home_assistant_alarming", "input_boolean.alarming");
        args.set("home_assistant_next_alarm", "input_datetime.next_alarm");
        HomeAssistantConfig::from_args(&args).unwrap().unwrap()
    }

    #[test]
    fn test_parse_states() {
        let entities = parse_states(&states());
        assert_eq!(entities.len(), 2);
        let weather = &entities["weather.openweathermap"];
        assert_eq!(weather.state, "partlycloudy");
        assert_eq!(weather.attribute("temperature"), Some("21.50000000"));
        assert_eq!(weather.attribute("humidity"), Some("40"));
        assert_eq!(weather.attribute("forecast"), None);
        assert_eq!(entities["sun.sun"].attribute("rising"), Some("1"));
    }

    #[test]
    fn test_parse_states_non_array() {
        assert!(parse_states(&json!({"message": "nope"})).is_empty());
    }

    #[test]
    fn test_extract_info_from_sun() {
        let entities = parse_states(&states());
        let info = extract_info(
            &entities,
            "weather.openweathermap",
            "sensor.custom_day_dark_sleep_w_o_weather",
        );
        assert_eq!(info.weather.as_deref(), Some("Partlycloudy"));
        assert_eq!(info.temperature, Some(21.5));
        assert_eq!(info.temperature_unit.as_deref(), Some("°C"));
        assert_eq!(info.is_dark, Some(false));
    }

    #[test]
    fn test_extract_info_prefers_darkness_sensor() {
        let mut entities = parse_states(&states());
        entities.insert(
            "sensor.dark".to_string(),
            Entity {
                state: "Sleep".to_string(),
                ..Entity::default()
            },
        );
        entities.insert(
            OPENWEATHERMAP_SENSOR.to_string(),
            Entity {
                state: "light rain".to_string(),
                ..Entity::default()
            },
        );
        let info = extract_info(&entities, "weather.openweathermap", "sensor.dark");
        assert_eq!(info.is_dark, Some(true));
        assert_eq!(info.weather.as_deref(), Some("Light Rain"));
    }

    #[test]
    fn test_extract_info_negative_elevation() {
        let mut entities = HashMap::new();
        let mut sun = Entity {
            state: "above_horizon".to_string(),
            ..Entity::default()
        };
        sun.attributes.insert("elevation".into(), "-0.5".into());
        entities.insert(SUN_ENTITY.to_string(), sun);
        let info = extract_info(&entities, "weather.x", "sensor.y");
        assert_eq!(info.is_dark, Some(true));
        assert_eq!(info.weather, None);

        assert_eq!(extract_info(&HashMap::new(), "a", "b").is_dark, None);
    }

    #[test]
    fn test_format_next_alarm() {
        let t = Local.with_ymd_and_hms(2026, 10, 15, 7, 0, 0).single().unwrap();
        assert_eq!(format_next_alarm(Some(t)), "2026-10-15T07:00:00");
        assert_eq!(format_next_alarm(None), "unknown");
    }

    #[test]
    fn test_send_tracker_changes_and_resend() {
        let config = ha_config();
        let mut tracker = SendTracker::default();
        let t0 = Instant::now();
        let state = PublishedState::default();

        // Nothing sent yet: every configured entity is due
        let due = tracker.due(&config, &state, t0);
        assert_eq!(
            due,
            vec![
                StateUpdate {
                    entity_id: "input_boolean.alarming".into(),
                    state: "off".into()
                },
                StateUpdate {
                    entity_id: "input_datetime.next_alarm".into(),
                    state: "unknown".into()
                },
            ]
        );
        for u in &due {
            tracker.record(u);
        }
        tracker.record_round(t0);
        assert!(tracker.due(&config, &state, t0 + Duration::from_secs(5)).is_empty());

        let ringing = PublishedState {
            alarming: true,
            ..state.clone()
        };
        let due = tracker.due(&config, &ringing, t0 + Duration::from_secs(6));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].state, "on");

        // Scheduled resend covers unchanged values too
        assert_eq!(tracker.due(&config, &state, t0 + RESEND_INTERVAL).len(), 2);
    }
}
