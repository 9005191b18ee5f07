//! The Waypoint: one stop along a route, owned by the caller for the tour's duration.

/// Opaque stable identity for a [`Waypoint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaypointId(pub String);

impl WaypointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for WaypointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single geographic stop along a route. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    id: WaypointId,
    index: usize,
    address: String,
    location_name: Option<String>,
    latitude: f64,
    longitude: f64,
    navigation_hint: Option<String>,
    distance_from_start_meters: Option<f64>,
    duration_from_start_seconds: Option<f64>,
}

impl Waypoint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: WaypointId,
        index: usize,
        address: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id,
            index,
            address: address.into(),
            location_name: None,
            latitude,
            longitude,
            navigation_hint: None,
            distance_from_start_meters: None,
            duration_from_start_seconds: None,
        }
    }

    pub fn with_location_name(mut self, name: impl Into<String>) -> Self {
        self.location_name = Some(name.into());
        self
    }

    pub fn with_navigation_hint(mut self, hint: impl Into<String>) -> Self {
        self.navigation_hint = Some(hint.into());
        self
    }

    pub fn with_cumulative_distance(mut self, meters: f64, seconds: f64) -> Self {
        self.distance_from_start_meters = Some(meters);
        self.duration_from_start_seconds = Some(seconds);
        self
    }

    pub fn id(&self) -> &WaypointId {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn location_name(&self) -> Option<&str> {
        self.location_name.as_deref()
    }

    /// Name used for text-matching bumps in the Selection Policy: the
    /// explicit location name if set, otherwise the full address.
    pub fn matchable_name(&self) -> &str {
        self.location_name.as_deref().unwrap_or(&self.address)
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn navigation_hint(&self) -> Option<&str> {
        self.navigation_hint.as_deref()
    }

    pub fn distance_from_start_meters(&self) -> Option<f64> {
        self.distance_from_start_meters
    }

    pub fn duration_from_start_seconds(&self) -> Option<f64> {
        self.duration_from_start_seconds
    }
}
