//! Configuration for the garbage collector, read from the same string-keyed properties file the
//! rest of the master draws its configuration from.

use std::collections::HashMap;
use std::time::Duration;


/// The property naming the GC cycle interval, in seconds.
pub const GC_INTERVAL_PROPERTY: &str = "Hypertable.Master.Gc.Interval";

/// Fallback interval, in seconds, used when the property is absent or unparsable.
pub const DEFAULT_GC_INTERVAL_SECS: i64 = 300;

/// A source of integer-valued configuration properties.
///
/// Mirrors the original `Properties::get_int(name, default)` call the GC makes for its interval:
/// a missing or malformed value silently falls back to `default` rather than failing startup.
pub trait PropertySource {
    fn get_int(&self, name: &str, default: i64) -> i64;
}

/// A trivial string-keyed [`PropertySource`], mainly useful for tests and for small embeddings
/// that don't otherwise need a full properties-file parser.
#[derive(Debug, Clone, Default)]
pub struct MapPropertySource(HashMap<String, String>);

impl MapPropertySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

impl PropertySource for MapPropertySource {
    fn get_int(&self, name: &str, default: i64) -> i64 {
        self.0.get(name).and_then(|value| value.parse().ok()).unwrap_or(default)
    }
}

/// Resolved GC configuration for one scheduler.
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Time between the end of one GC cycle and the start of the next.
    pub interval: Duration,
    /// When set, the scheduler scans and logs as usual but issues no filesystem removals or
    /// METADATA deletes.
    pub dryrun:   bool,
}

impl GcConfig {
    /// Reads [`GC_INTERVAL_PROPERTY`] from `props`, falling back to
    /// [`DEFAULT_GC_INTERVAL_SECS`] when it is absent, not a valid integer, or not positive.
    #[must_use]
    pub fn from_properties(props: &impl PropertySource, dryrun: bool) -> Self {
        let secs = props.get_int(GC_INTERVAL_PROPERTY, DEFAULT_GC_INTERVAL_SECS);
        let secs = u64::try_from(secs).unwrap_or_else(|_| {
            tracing::warn!(
                secs,
                "{GC_INTERVAL_PROPERTY} must be a positive number of seconds, using default",
            );
            u64::try_from(DEFAULT_GC_INTERVAL_SECS).expect("default interval is non-negative")
        });
        Self { interval: Duration::from_secs(secs), dryrun }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_property_falls_back_to_default() {
        let props = MapPropertySource::new();
        let config = GcConfig::from_properties(&props, false);
        assert_eq!(config.interval, Duration::from_secs(300));
    }

    #[test]
    fn unparsable_property_falls_back_to_default() {
        let mut props = MapPropertySource::new();
        props.set(GC_INTERVAL_PROPERTY, "soon");
        let config = GcConfig::from_properties(&props, false);
        assert_eq!(config.interval, Duration::from_secs(300));
    }

    #[test]
    fn negative_property_falls_back_to_default() {
        let mut props = MapPropertySource::new();
        props.set(GC_INTERVAL_PROPERTY, "-5");
        let config = GcConfig::from_properties(&props, false);
        assert_eq!(config.interval, Duration::from_secs(300));
    }

    #[test]
    fn valid_property_is_honored() {
        let mut props = MapPropertySource::new();
        props.set(GC_INTERVAL_PROPERTY, "60");
        let config = GcConfig::from_properties(&props, true);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert!(config.dryrun);
    }
}
