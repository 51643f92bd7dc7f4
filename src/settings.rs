use config::{Config, ConfigError, File};
use log::warn;
use serde::Deserialize;
use serde_json;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::geo::LatLon;
use crate::polling::{effective_interval, MIN_REFRESH_INTERVAL};
use crate::spot::SpotSource;
use crate::stream_client::{Endpoint, StreamConfig};
use crate::working_set::{CLUSTER_CAPACITY, SKIMMER_CAPACITY};

pub const DEFAULT_CONFIG_PATH: &str = "Config.toml";

pub const DEFAULT_CLUSTER_HOST: &str = "dxc.nc7j.com";
pub const DEFAULT_CLUSTER_PORT: u16 = 7373;
pub const DEFAULT_SKIMMER_HOST: &str = "telnet.reversebeacon.net";
pub const DEFAULT_SKIMMER_PORT: u16 = 7000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Station {
    /// Own callsign; always part of the watch set and the default login id.
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Station {
    /// Home position, if both coordinates are set and in range.
    pub fn home(&self) -> Option<LatLon> {
        let position = LatLon::new(self.latitude?, self.longitude?);
        position.is_valid().then_some(position)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Watch {
    #[serde(default)]
    pub list: Vec<String>,
    #[serde(default = "default_notification_window_seconds")]
    pub notification_window_seconds: u64,
}

fn default_notification_window_seconds() -> u64 {
    300 // 5 minutes
}

impl Default for Watch {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            notification_window_seconds: default_notification_window_seconds(),
        }
    }
}

impl Watch {
    pub fn notification_window(&self) -> Duration {
        Duration::from_secs(self.notification_window_seconds)
    }
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Sources {
    #[serde(default = "default_true")]
    pub pota: bool,
    #[serde(default = "default_true")]
    pub sota: bool,
    #[serde(default = "default_true")]
    pub wwff: bool,
    #[serde(default = "default_true")]
    pub wwbota: bool,
    #[serde(default = "default_true")]
    pub cluster: bool,
    #[serde(default = "default_false")]
    pub skimmer: bool,
    #[serde(default = "default_false")]
    pub digital: bool,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            pota: default_true(),
            sota: default_true(),
            wwff: default_true(),
            wwbota: default_true(),
            cluster: default_true(),
            skimmer: default_false(),
            digital: default_false(),
        }
    }
}

impl Sources {
    pub fn is_enabled(&self, source: SpotSource) -> bool {
        match source {
            SpotSource::Pota => self.pota,
            SpotSource::Sota => self.sota,
            SpotSource::Wwff => self.wwff,
            SpotSource::Wwbota => self.wwbota,
            SpotSource::Cluster => self.cluster,
            SpotSource::Skimmer => self.skimmer,
            SpotSource::Digital => self.digital,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Polling {
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_pota_url")]
    pub pota_url: String,
    #[serde(default = "default_sota_url")]
    pub sota_url: String,
    #[serde(default = "default_sota_summit_url")]
    pub sota_summit_url: String,
    #[serde(default = "default_wwff_url")]
    pub wwff_url: String,
    #[serde(default = "default_wwbota_url")]
    pub wwbota_url: String,
    #[serde(default = "default_digital_url")]
    pub digital_url: String,
    #[serde(default = "default_summit_lookup_concurrency")]
    pub summit_lookup_concurrency: usize,
}

fn default_refresh_seconds() -> u64 {
    30
}
fn default_http_timeout_seconds() -> u64 {
    10
}
fn default_pota_url() -> String {
    crate::adapters::pota::DEFAULT_URL.to_string()
}
fn default_sota_url() -> String {
    crate::adapters::sota::DEFAULT_URL.to_string()
}
fn default_sota_summit_url() -> String {
    crate::adapters::sota::DEFAULT_SUMMIT_URL.to_string()
}
fn default_wwff_url() -> String {
    crate::adapters::wwff::DEFAULT_URL.to_string()
}
fn default_wwbota_url() -> String {
    crate::adapters::wwbota::DEFAULT_URL.to_string()
}
fn default_digital_url() -> String {
    crate::adapters::digital::DEFAULT_URL.to_string()
}
fn default_summit_lookup_concurrency() -> usize {
    crate::summit_locator::DEFAULT_LOOKUP_CONCURRENCY
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            refresh_seconds: default_refresh_seconds(),
            http_timeout_seconds: default_http_timeout_seconds(),
            pota_url: default_pota_url(),
            sota_url: default_sota_url(),
            sota_summit_url: default_sota_summit_url(),
            wwff_url: default_wwff_url(),
            wwbota_url: default_wwbota_url(),
            digital_url: default_digital_url(),
            summit_lookup_concurrency: default_summit_lookup_concurrency(),
        }
    }
}

impl Polling {
    pub fn refresh_interval(&self) -> Duration {
        effective_interval(Duration::from_secs(self.refresh_seconds))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds.max(1))
    }
}

/// One telnet-style feed. Unset fields fall back to the feed's own defaults.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct StreamFeed {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Login id; the station callsign when unset.
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub reconnect_seconds: Option<u64>,
    #[serde(default)]
    pub keepalive_seconds: Option<u64>,
    #[serde(default)]
    pub connect_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl StreamFeed {
    fn endpoint_or(&self, host: &str, port: u16) -> Endpoint {
        Endpoint::new(
            self.host.clone().unwrap_or_else(|| host.to_string()),
            self.port.unwrap_or(port),
        )
    }

    fn apply(&self, mut base: StreamConfig, callsign: Option<&String>) -> StreamConfig {
        base.login = self.login.clone().or_else(|| callsign.cloned());
        if let Some(secs) = self.reconnect_seconds {
            base.reconnect_delay = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.keepalive_seconds {
            base.keepalive_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.connect_timeout_seconds {
            base.connect_timeout = Duration::from_secs(secs.max(1));
        }
        base
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PanadapterSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_panadapter_min_interval_seconds")]
    pub min_interval_seconds: u64,
    /// 0 disables the age filter.
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,
}

fn default_panadapter_min_interval_seconds() -> u64 {
    5
}
fn default_max_age_minutes() -> u64 {
    15
}

impl Default for PanadapterSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_interval_seconds: default_panadapter_min_interval_seconds(),
            max_age_minutes: default_max_age_minutes(),
        }
    }
}

impl PanadapterSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_minutes * 60)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Distribution {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_ui_bus_capacity")]
    pub ui_bus_capacity: usize,
}

fn default_debounce_ms() -> u64 {
    2000
}
fn default_ui_bus_capacity() -> usize {
    256
}

impl Default for Distribution {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ui_bus_capacity: default_ui_bus_capacity(),
        }
    }
}

impl Distribution {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Geo {
    #[serde(default = "default_cty_path")]
    pub cty_path: String,
}

fn default_cty_path() -> String {
    "cty.dat".to_string()
}

impl Default for Geo {
    fn default() -> Self {
        Self {
            cty_path: default_cty_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub station: Station,
    #[serde(default)]
    pub watch: Watch,
    #[serde(default)]
    pub sources: Sources,
    #[serde(default)]
    pub polling: Polling,
    #[serde(default)]
    pub cluster: StreamFeed,
    #[serde(default)]
    pub skimmer: StreamFeed,
    /// Keyed by sink name. Keys are lowercased by the config loader.
    #[serde(default)]
    pub panadapters: HashMap<String, PanadapterSettings>,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default)]
    pub geo: Geo,
}

impl Settings {
    /// Loads `Config.toml` from the working directory plus env overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(DEFAULT_CONFIG_PATH)
    }

    /// Loads the given file (optional on disk) plus env overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok());
        settings.validate();
        Ok(settings)
    }

    /// Environment-style overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SPOTFEED_CALLSIGN") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.station.callsign = Some(trimmed.to_string());
            }
        }
        if let Some(raw) = lookup("SPOTFEED_WATCH_LIST") {
            if let Some(list) = parse_string_list(&raw) {
                self.watch.list = list;
            }
        }
        if let Some(raw) = lookup("SPOTFEED_REFRESH_SECONDS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.polling.refresh_seconds = secs,
                Err(e) => warn!("⚠️ [Settings] Ignoring SPOTFEED_REFRESH_SECONDS='{}': {}", raw, e),
            }
        }
        if let Some(raw) = lookup("SPOTFEED_CTY_PATH") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.geo.cty_path = trimmed.to_string();
            }
        }
    }

    /// Clamps values that have hard floors.
    pub fn validate(&mut self) {
        let floor = MIN_REFRESH_INTERVAL.as_secs();
        if self.polling.refresh_seconds < floor {
            warn!(
                "⚠️ [Settings] refresh_seconds {} below minimum, using {}",
                self.polling.refresh_seconds, floor
            );
            self.polling.refresh_seconds = floor;
        }
        if self.polling.summit_lookup_concurrency == 0 {
            self.polling.summit_lookup_concurrency = default_summit_lookup_concurrency();
        }
        if let Some(requested) = self.skimmer.capacity {
            let capped = self.skimmer_capacity();
            if requested != capped {
                warn!(
                    "⚠️ [Settings] skimmer capacity {} out of range, using {}",
                    requested, capped
                );
                self.skimmer.capacity = Some(capped);
            }
        }
    }

    /// Cluster working-set size.
    pub fn cluster_capacity(&self) -> usize {
        self.cluster.capacity.unwrap_or(CLUSTER_CAPACITY).max(1)
    }

    /// Skimmer working-set size, never above `SKIMMER_CAPACITY`.
    pub fn skimmer_capacity(&self) -> usize {
        self.skimmer
            .capacity
            .unwrap_or(SKIMMER_CAPACITY)
            .clamp(1, SKIMMER_CAPACITY)
    }

    pub fn cluster_endpoint(&self) -> Endpoint {
        self.cluster.endpoint_or(DEFAULT_CLUSTER_HOST, DEFAULT_CLUSTER_PORT)
    }

    pub fn skimmer_endpoint(&self) -> Endpoint {
        self.skimmer.endpoint_or(DEFAULT_SKIMMER_HOST, DEFAULT_SKIMMER_PORT)
    }

    pub fn cluster_config(&self) -> StreamConfig {
        self.cluster
            .apply(StreamConfig::cluster(None), self.station.callsign.as_ref())
    }

    pub fn skimmer_config(&self) -> StreamConfig {
        self.skimmer
            .apply(StreamConfig::skimmer(None), self.station.callsign.as_ref())
    }
}

fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    // JSON array first, then fall back to a plain comma list
    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']');
        return Some(split_list(without_brackets));
    }

    Some(split_list(trimmed))
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let settings = Settings::load(&missing.to_string_lossy()).unwrap();
        assert_eq!(settings.polling.refresh_seconds, 30);
        assert!(settings.sources.is_enabled(SpotSource::Pota));
        assert!(!settings.sources.is_enabled(SpotSource::Skimmer));
        assert_eq!(settings.cluster_endpoint(), Endpoint::new(DEFAULT_CLUSTER_HOST, DEFAULT_CLUSTER_PORT));
        assert_eq!(settings.distribution.debounce(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_sections() {
        let (_dir, path) = write_config(
            r#"
[station]
callsign = "N0CALL"
latitude = 40.0
longitude = -105.0

[watch]
list = ["K1ABC", "W1AW"]

[sources]
skimmer = true
wwbota = false

[polling]
refresh_seconds = 5

[skimmer]
host = "localhost"
port = 7300
reconnect_seconds = 20

[panadapters.bench]
max_age_minutes = 0
"#,
        );
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.station.callsign.as_deref(), Some("N0CALL"));
        assert!(settings.station.home().is_some());
        assert_eq!(settings.watch.list.len(), 2);
        assert!(settings.sources.skimmer);
        assert!(!settings.sources.wwbota);
        // Clamped to the floor
        assert_eq!(settings.polling.refresh_seconds, 15);
        assert_eq!(settings.skimmer_endpoint(), Endpoint::new("localhost", 7300));

        let skimmer = settings.skimmer_config();
        assert_eq!(skimmer.login.as_deref(), Some("N0CALL"));
        assert_eq!(skimmer.reconnect_delay, Duration::from_secs(20));

        let bench = &settings.panadapters["bench"];
        assert!(bench.enabled);
        assert_eq!(bench.max_age(), Duration::ZERO);
        assert_eq!(bench.min_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| match key {
            "SPOTFEED_CALLSIGN" => Some(" K9XYZ ".to_string()),
            "SPOTFEED_WATCH_LIST" => Some(r#"["AA1A", "BB2B"]"#.to_string()),
            "SPOTFEED_REFRESH_SECONDS" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(settings.station.callsign.as_deref(), Some("K9XYZ"));
        assert_eq!(settings.watch.list, vec!["AA1A", "BB2B"]);
        assert_eq!(settings.polling.refresh_seconds, 30);
        assert_eq!(settings.cluster_config().login.as_deref(), Some("K9XYZ"));
    }

    #[test]
    fn test_parse_string_list() {
        assert_eq!(parse_string_list("a, b,,c"), Some(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(parse_string_list("[x, 'y']"), Some(vec!["x".into(), "y".into()]));
        assert_eq!(parse_string_list("  "), Some(vec![]));
    }

    #[test]
    fn test_home_requires_valid_coordinates() {
        let station = Station {
            callsign: None,
            latitude: Some(95.0),
            longitude: Some(0.0),
        };
        assert!(station.home().is_none());
    }

    #[test]
    fn test_shipped_config_has_two_panadapters() {
        use crate::hub::HubSinks;

        let settings = Settings::load(concat!(env!("CARGO_MANIFEST_DIR"), "/Config.toml")).unwrap();
        let mut names: Vec<&String> = settings.panadapters.keys().collect();
        names.sort();
        assert_eq!(names, vec!["smartsdr", "tci"]);
        assert_eq!(settings.panadapters["smartsdr"].max_age(), Duration::from_secs(15 * 60));
        assert_eq!(settings.panadapters["tci"].max_age(), Duration::from_secs(30 * 60));
        assert_eq!(HubSinks::logging(&settings).panadapters.len(), 2);
    }

    #[test]
    fn test_skimmer_capacity_is_capped() {
        let mut settings = Settings::default();
        assert_eq!(settings.skimmer_capacity(), SKIMMER_CAPACITY);
        assert_eq!(settings.cluster_capacity(), CLUSTER_CAPACITY);

        settings.skimmer.capacity = Some(500);
        // Unvalidated settings are still capped at the point of use
        assert_eq!(settings.skimmer_capacity(), SKIMMER_CAPACITY);
        settings.validate();
        assert_eq!(settings.skimmer.capacity, Some(SKIMMER_CAPACITY));

        settings.skimmer.capacity = Some(20);
        settings.validate();
        assert_eq!(settings.skimmer_capacity(), 20);
    }
}
