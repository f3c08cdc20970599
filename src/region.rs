//! Canonical service regions.
//!
//! A [`Region`] is a thin wrapper around an entry of [`KNOWN_REGIONS`],
//! so two regions are equal exactly when their system names are equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::AccessError;

/// Every region this crate can address: `(system name, display name)`.
pub const KNOWN_REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "US East (N. Virginia)"),
    ("us-east-2", "US East (Ohio)"),
    ("us-west-1", "US West (N. California)"),
    ("us-west-2", "US West (Oregon)"),
    ("af-south-1", "Africa (Cape Town)"),
    ("ap-east-1", "Asia Pacific (Hong Kong)"),
    ("ap-south-1", "Asia Pacific (Mumbai)"),
    ("ap-south-2", "Asia Pacific (Hyderabad)"),
    ("ap-southeast-1", "Asia Pacific (Singapore)"),
    ("ap-southeast-2", "Asia Pacific (Sydney)"),
    ("ap-southeast-3", "Asia Pacific (Jakarta)"),
    ("ap-southeast-4", "Asia Pacific (Melbourne)"),
    ("ap-northeast-1", "Asia Pacific (Tokyo)"),
    ("ap-northeast-2", "Asia Pacific (Seoul)"),
    ("ap-northeast-3", "Asia Pacific (Osaka)"),
    ("ca-central-1", "Canada (Central)"),
    ("ca-west-1", "Canada West (Calgary)"),
    ("eu-central-1", "Europe (Frankfurt)"),
    ("eu-central-2", "Europe (Zurich)"),
    ("eu-west-1", "Europe (Ireland)"),
    ("eu-west-2", "Europe (London)"),
    ("eu-west-3", "Europe (Paris)"),
    ("eu-south-1", "Europe (Milan)"),
    ("eu-south-2", "Europe (Spain)"),
    ("eu-north-1", "Europe (Stockholm)"),
    ("il-central-1", "Israel (Tel Aviv)"),
    ("me-south-1", "Middle East (Bahrain)"),
    ("me-central-1", "Middle East (UAE)"),
    ("sa-east-1", "South America (Sao Paulo)"),
    ("us-gov-east-1", "AWS GovCloud (US-East)"),
    ("us-gov-west-1", "AWS GovCloud (US-West)"),
    ("cn-north-1", "China (Beijing)"),
    ("cn-northwest-1", "China (Ningxia)"),
];

/// A geographic deployment of the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region(&'static str);

impl Region {
    pub const US_EAST_1: Region = Region("us-east-1");
    pub const US_WEST_2: Region = Region("us-west-2");
    pub const AP_SOUTH_1: Region = Region("ap-south-1");
    pub const EU_CENTRAL_1: Region = Region("eu-central-1");
    pub const EU_WEST_1: Region = Region("eu-west-1");

    /// Look up a region by system name, ignoring ASCII case.
    pub fn from_code(code: &str) -> Option<Region> {
        KNOWN_REGIONS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(code))
            .map(|(name, _)| Region(*name))
    }

    /// The canonical system name, e.g. `eu-west-1`.
    pub fn code(&self) -> &'static str {
        self.0
    }

    /// Human-readable name, e.g. `Europe (Ireland)`.
    pub fn display_name(&self) -> &'static str {
        KNOWN_REGIONS
            .iter()
            .find(|(name, _)| *name == self.0)
            .map(|(_, display)| *display)
            .unwrap_or(self.0)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for Region {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::from_code(s.trim()).ok_or_else(|| AccessError::UnknownRegionCode {
            code: s.to_string(),
        })
    }
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}
