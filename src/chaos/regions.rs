//! Simulated geographic latency profiles.

use rand::Rng;
use std::time::Duration;

/// Added latency range for a named region, relative to a "US-Central" origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionProfile {
    pub name: &'static str,
    pub min: Duration,
    pub max: Duration,
}

impl RegionProfile {
    const fn millis(name: &'static str, min: u64, max: u64) -> Self {
        Self {
            name,
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    /// Draw a delay uniformly from `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

const REGIONS: &[RegionProfile] = &[
    RegionProfile::millis("us-east-1", 10, 50),
    RegionProfile::millis("us-west-1", 40, 80),
    RegionProfile::millis("eu-west-1", 80, 120),
    RegionProfile::millis("ap-northeast-1", 180, 250), // Tokyo
    RegionProfile::millis("ap-southeast-2", 200, 300), // Sydney
    RegionProfile::millis("sa-east-1", 150, 220),      // Sao Paulo
];

/// Look up a region profile by identifier.
pub fn lookup(region: &str) -> Option<&'static RegionProfile> {
    REGIONS.iter().find(|r| r.name == region)
}

/// All known region identifiers.
pub fn known_regions() -> impl Iterator<Item = &'static str> {
    REGIONS.iter().map(|r| r.name)
}
