//! The geo collaborator: resolves an IP to an ISO-3166 country code.
//! The production implementation wraps a memory-mapped MaxMind
//! database.

use std::net::IpAddr;
use std::path::Path;

use cerberus_common::error::BouncerError;

/// Resolves an IP to a two-letter country code. Implementations must
/// tolerate lookup misses by returning `None` rather than erroring —
/// country-scope resolution is best-effort augmentation, not a hard
/// dependency.
pub trait GeoLocator: Send + Sync {
    fn country(&self, ip: IpAddr) -> Option<String>;
}

/// Looks up nothing; used when `geolocation.enabled = false`.
pub struct NoopGeoLocator;

impl GeoLocator for NoopGeoLocator {
    fn country(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// Memory-mapped, read-only MaxMind GeoIP2/GeoLite2 database reader.
/// Safe to share across requests: the mapping is opened once at
/// startup.
pub struct MaxMindGeoLocator {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindGeoLocator {
    pub fn open(database_path: &Path) -> Result<Self, BouncerError> {
        let reader = maxminddb::Reader::open_readfile(database_path)
            .map_err(|e| BouncerError::Config(format!("failed to open geo database: {e}")))?;
        Ok(Self { reader })
    }
}

impl GeoLocator for MaxMindGeoLocator {
    fn country(&self, ip: IpAddr) -> Option<String> {
        let city = self
            .reader
            .lookup::<maxminddb::geoip2::City>(ip)
            .ok()
            .flatten()?;
        city.country?.iso_code.map(|code| code.to_string())
    }
}
