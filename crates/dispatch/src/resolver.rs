//! Recipient resolution seam for broadcast dispatches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::alert::{ChannelKind, ContactInfo};
use crate::error::DispatchError;

/// WGS84 coordinate of an emergency event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Trust and eligibility filtering applied during recipient selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientFilters {
    /// Recipients below this trust score are excluded.
    pub min_trust_score: f64,
    /// If set, only recipients reachable on at least one of these
    /// channels are returned.
    pub required_channels: Option<Vec<ChannelKind>>,
    /// Optional cap on the number of recipients returned.
    pub limit: Option<usize>,
}

/// One candidate recipient for a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedRecipient {
    pub user_id: String,
    pub contacts: ContactInfo,
    /// Channels to attempt for this recipient, in preference order.
    pub preferred_channels: Vec<ChannelKind>,
    pub distance_meters: f64,
    pub trust_score: f64,
}

/// Geospatial recipient lookup, implemented by the surrounding platform.
///
/// Called once per broadcast-style dispatch (one event fanned out to many
/// recipients), never once per individual alert.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn resolve_recipients(
        &self,
        location: GeoPoint,
        radius_meters: f64,
        filters: &RecipientFilters,
    ) -> Result<Vec<ResolvedRecipient>, DispatchError>;
}
