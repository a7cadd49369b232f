//! Static reference data shared by the generator, transformer and dimension builder.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ChannelDim;

/// A city with the state and sales region it rolls up to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Geography {
    pub city: String,
    pub state: String,
    pub region: String,
}

/// Provider of reference sets; swapped for a fixture in tests.
pub trait ReferenceData: Send + Sync {
    fn channels(&self) -> &[ChannelDim];

    fn segments(&self) -> &[String];

    fn geographies(&self) -> &[Geography];

    fn channel(&self, channel_key: i32) -> Option<&ChannelDim> {
        self.channels()
            .iter()
            .find(|channel| channel.channel_key == channel_key)
    }
}

/// Reference data held in memory, usually loaded from the pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StaticReferenceData {
    pub channels: Vec<ChannelDim>,
    pub segments: Vec<String>,
    pub geographies: Vec<Geography>,
}

impl Default for StaticReferenceData {
    fn default() -> Self {
        Self {
            channels: vec![
                channel(1, "Credit Card", 2.5),
                channel(2, "Debit Card", 1.0),
                channel(3, "UPI", 0.5),
                channel(4, "Net Banking", 1.5),
            ],
            segments: ["Retail", "Corporate", "SMB", "Enterprise"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            geographies: vec![
                geography("Mumbai", "Maharashtra", "West"),
                geography("Pune", "Maharashtra", "West"),
                geography("Ahmedabad", "Gujarat", "West"),
                geography("Delhi", "Delhi", "North"),
                geography("Jaipur", "Rajasthan", "North"),
                geography("Bengaluru", "Karnataka", "South"),
                geography("Chennai", "Tamil Nadu", "South"),
                geography("Hyderabad", "Telangana", "South"),
                geography("Kolkata", "West Bengal", "East"),
                geography("Bhubaneswar", "Odisha", "East"),
            ],
        }
    }
}

impl StaticReferenceData {
    /// Reject sets the stages cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::Configuration("reference channels must not be empty".to_string()));
        }
        let mut keys = BTreeSet::new();
        for channel in &self.channels {
            if !keys.insert(channel.channel_key) {
                return Err(Error::Configuration(format!(
                    "duplicate channel_key {}",
                    channel.channel_key
                )));
            }
            if !(channel.fee_percent >= 0.0 && channel.fee_percent.is_finite()) {
                return Err(Error::Configuration(format!(
                    "channel {} has invalid fee_percent {}",
                    channel.channel_key, channel.fee_percent
                )));
            }
        }
        if self.segments.is_empty() {
            return Err(Error::Configuration("reference segments must not be empty".to_string()));
        }
        if self.geographies.is_empty() {
            return Err(Error::Configuration(
                "reference geographies must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl ReferenceData for StaticReferenceData {
    fn channels(&self) -> &[ChannelDim] {
        &self.channels
    }

    fn segments(&self) -> &[String] {
        &self.segments
    }

    fn geographies(&self) -> &[Geography] {
        &self.geographies
    }
}

fn channel(channel_key: i32, channel_name: &str, fee_percent: f64) -> ChannelDim {
    ChannelDim {
        channel_key,
        channel_name: channel_name.to_string(),
        fee_percent,
    }
}

fn geography(city: &str, state: &str, region: &str) -> Geography {
    Geography {
        city: city.to_string(),
        state: state.to_string(),
        region: region.to_string(),
    }
}
