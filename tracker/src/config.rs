use std::{env, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be a positive number, got {value}")]
    NotPositive { key: &'static str, value: f64 },
}

/// How the distance between the runner and the planned path is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OffRouteMeasure {
    /// Nearest vertex of the planned path.
    #[default]
    Vertices,
    /// Nearest point on any segment of the planned path.
    Segments,
}

/// Thresholds used by the live tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub off_route_threshold_m: f64,
    pub off_route_measure: OffRouteMeasure,
    pub step_proximity_m: f64,
    pub poi_alert_radius_m: f64,
    pub poi_search_radius_m: f64,
    pub poi_category: String,
    /// Samples reporting a worse accuracy than this are dropped.
    pub max_accuracy_m: f64,
    #[serde(with = "duration_millis")]
    pub tick_period: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            off_route_threshold_m: 40.0,
            off_route_measure: OffRouteMeasure::Vertices,
            step_proximity_m: 25.0,
            poi_alert_radius_m: 100.0,
            poi_search_radius_m: 1_000.0,
            poi_category: "cafe".into(),
            max_accuracy_m: 100.0,
            tick_period: Duration::from_secs(1),
        }
    }
}

impl TrackingConfig {
    /// Defaults overridden by `STRIDE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env_parse("STRIDE_OFF_ROUTE_M")? {
            config.off_route_threshold_m = v;
        }
        if let Some(v) = env_parse::<String>("STRIDE_OFF_ROUTE_MEASURE")? {
            config.off_route_measure = <OffRouteMeasure as clap::ValueEnum>::from_str(&v, true)
                .map_err(|_| ConfigError::InvalidValue {
                    key: "STRIDE_OFF_ROUTE_MEASURE",
                    value: v,
                })?;
        }
        if let Some(v) = env_parse("STRIDE_STEP_PROXIMITY_M")? {
            config.step_proximity_m = v;
        }
        if let Some(v) = env_parse("STRIDE_POI_ALERT_M")? {
            config.poi_alert_radius_m = v;
        }
        if let Some(v) = env_parse("STRIDE_POI_SEARCH_M")? {
            config.poi_search_radius_m = v;
        }
        if let Some(v) = env_parse("STRIDE_POI_CATEGORY")? {
            config.poi_category = v;
        }
        if let Some(v) = env_parse("STRIDE_MAX_ACCURACY_M")? {
            config.max_accuracy_m = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("off_route_threshold_m", self.off_route_threshold_m),
            ("step_proximity_m", self.step_proximity_m),
            ("poi_alert_radius_m", self.poi_alert_radius_m),
            ("poi_search_radius_m", self.poi_search_radius_m),
            ("max_accuracy_m", self.max_accuracy_m),
        ];
        for (key, value) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { key, value });
            }
        }
        Ok(())
    }
}

/// Endpoints and credentials of the external services.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub osrm_base_url: String,
    pub osrm_profile: String,
    pub overpass_url: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            osrm_base_url: "https://router.project-osrm.org".into(),
            osrm_profile: "walking".into(),
            overpass_url: "https://overpass-api.de/api/interpreter".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            gemini_model: "gemini-2.0-flash".into(),
            gemini_api_key: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            osrm_base_url: env::var("OSRM_URL").unwrap_or(defaults.osrm_base_url),
            osrm_profile: env::var("OSRM_PROFILE").unwrap_or(defaults.osrm_profile),
            overpass_url: env::var("OVERPASS_URL").unwrap_or(defaults.overpass_url),
            gemini_base_url: env::var("GEMINI_URL").unwrap_or(defaults.gemini_base_url),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            request_timeout: defaults.request_timeout,
        }
    }
}

fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let parsed = value.trim().parse::<T>();
            match parsed {
                Ok(parsed) => Ok(Some(parsed)),
                Err(_) => Err(ConfigError::InvalidValue { key, value }),
            }
        }
        Err(_) => Ok(None),
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
