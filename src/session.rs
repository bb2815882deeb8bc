//! Session: configuration, backend, lookup cache and clock for one host run.

use crate::backend::{Dispatcher, Placement};
use crate::cache::{LookupCache, LookupKind};
use crate::config::SessionConfig;
use crate::orchestrator::Orchestrator;
use crate::policy::Policies;
use anyhow::Context;
use apiclient::{HttpTransport, Transport};
use converge::{Clock, ConvergenceTarget, Error, Result, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Everything an operation needs, shared by all operations of a run.
///
/// The backend variant is fixed at construction.
pub struct Session {
    config: SessionConfig,
    dispatcher: Dispatcher,
    cache: LookupCache,
    policies: Policies,
    clock: Arc<dyn Clock>,
}

impl Session {
    /// Validate `config` and build a session over `transport`.
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        config.validate().context("Invalid session configuration")?;
        let dispatcher = Dispatcher::for_variant(config.variant, transport, &config.region);
        let policies = Policies::from_settings(&config.retry);
        log::debug!(
            "session: {} backend, region {}, endpoint {}",
            config.variant,
            config.region,
            config.endpoint
        );
        Ok(Self {
            config,
            dispatcher,
            cache: LookupCache::new(),
            policies,
            clock: Arc::new(SystemClock),
        })
    }

    /// Build a session over an unsigned HTTP transport to the configured endpoint.
    pub fn connect(config: SessionConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::with_endpoint(config.endpoint.as_str());
        Self::new(config, Arc::new(transport))
    }

    /// Replace the clock (tests use a manual clock).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Backend dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Retry policies.
    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    /// Time source.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Region/zone cache.
    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Orchestrator borrowing this session.
    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(self)
    }

    /// Provider key of the session's region.
    pub fn region_key(&self) -> Result<String> {
        let code = self.config.region.as_str();
        self.cache.get_or_resolve(LookupKind::Region, code, || {
            self.dispatcher
                .list_regions()?
                .into_iter()
                .find(|r| r.code == code)
                .map(|r| r.key)
                .ok_or_else(|| Error::lookup(LookupKind::Region.to_string(), code))
        })
    }

    /// Provider key of a zone in the session's region.
    pub fn zone_key(&self, code: &str) -> Result<String> {
        if let Some(key) = self.cache.get(LookupKind::Zone, code) {
            return Ok(key);
        }
        let region_key = self.region_key()?;
        self.cache.get_or_resolve(LookupKind::Zone, code, || {
            self.dispatcher
                .list_zones(&region_key)?
                .into_iter()
                .find(|z| z.code == code)
                .map(|z| z.key)
                .ok_or_else(|| Error::lookup(LookupKind::Zone.to_string(), code))
        })
    }

    /// Resolve placement for a zone code, falling back to the session zone.
    pub fn placement(&self, zone: Option<&str>) -> Result<Placement> {
        let region_key = self.region_key()?;
        let zone_key = match zone.or(self.config.zone.as_deref()) {
            Some(code) => Some(self.zone_key(code)?),
            None => None,
        };
        Ok(Placement { region_key, zone_key })
    }

    /// Target with the session's poll interval, `timeout` and poll-tolerated codes.
    pub fn target(&self, target: ConvergenceTarget, timeout: Duration) -> ConvergenceTarget {
        target
            .timeout(timeout)
            .poll_interval(self.config.poll_interval())
            .retry_on(self.policies.poll_codes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiclient::MockTransport;
    use converge::{BackendVariant, ManualClock};
    use serde_json::json;

    fn legacy_session() -> (MockTransport, Session) {
        let mock = MockTransport::new();
        let config = SessionConfig {
            variant: BackendVariant::Legacy,
            ..SessionConfig::default()
        };
        let session = Session::new(config, Arc::new(mock.clone()))
            .unwrap()
            .with_clock(Arc::new(ManualClock::new()));
        (mock, session)
    }

    fn script_regions(mock: &MockTransport) {
        mock.respond(
            "getRegionList",
            json!({
                "returnCode": "0",
                "regionList": [{ "regionNo": "1", "regionCode": "KR", "regionName": "Korea" }]
            }),
        );
        mock.respond(
            "getZoneList",
            json!({
                "returnCode": "0",
                "zoneList": [
                    { "zoneNo": "2", "zoneCode": "KR-1", "zoneName": "KR-1" },
                    { "zoneNo": "3", "zoneCode": "KR-2", "zoneName": "KR-2" }
                ]
            }),
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            region: String::new(),
            ..SessionConfig::default()
        };
        assert!(Session::new(config, Arc::new(MockTransport::new())).is_err());
    }

    #[test]
    fn test_zone_resolution_is_cached() {
        let (mock, session) = legacy_session();
        script_regions(&mock);

        assert_eq!(session.zone_key("KR-2").unwrap(), "3");
        assert_eq!(session.zone_key("KR-2").unwrap(), "3");
        assert_eq!(session.zone_key("KR-1").unwrap(), "2");
        assert_eq!(mock.call_count("getRegionList"), 1);
        assert_eq!(mock.call_count("getZoneList"), 2);
        assert_eq!(mock.calls()[1].get("regionNo"), Some("1"));
    }

    #[test]
    fn test_unknown_zone_is_lookup_error_and_not_cached() {
        let (mock, session) = legacy_session();
        script_regions(&mock);
        let err = session.zone_key("KR-9").unwrap_err();
        assert!(matches!(err, Error::Lookup { ref code, .. } if code == "KR-9"));
        assert_eq!(session.cache().get(LookupKind::Zone, "KR-9"), None);
    }

    #[test]
    fn test_placement_falls_back_to_session_zone() {
        let mock = MockTransport::new();
        script_regions(&mock);
        let config = SessionConfig {
            variant: BackendVariant::Legacy,
            zone: Some("KR-1".into()),
            ..SessionConfig::default()
        };
        let session = Session::new(config, Arc::new(mock)).unwrap();
        let placement = session.placement(None).unwrap();
        assert_eq!(placement.region_key, "1");
        assert_eq!(placement.zone_key.as_deref(), Some("2"));

        let explicit = session.placement(Some("KR-2")).unwrap();
        assert_eq!(explicit.zone_key.as_deref(), Some("3"));
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let config = SessionConfig {
            poll_interval: 0,
            ..SessionConfig::default()
        };
        assert!(Session::connect(config).is_err());
    }

    #[test]
    fn test_target_uses_session_settings() {
        let (_, session) = legacy_session();
        let target = session.target(ConvergenceTarget::reach(["RUN"]), Duration::from_secs(60));
        assert_eq!(target.timeout, Duration::from_secs(60));
        assert_eq!(target.poll_interval, Duration::from_secs(1));
        assert!(target.retryable_codes.contains("25033"));
    }
}
