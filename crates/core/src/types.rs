/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Offline operation identifier (UUIDv7: millisecond time prefix + random bits).
pub type OperationId = uuid::Uuid;

/// Decision record identifier.
pub type RecordId = uuid::Uuid;

/// Best-effort capture of where an action came from.
///
/// Advisory only: never validated, never hashed, never used to classify
/// conflicts. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Provenance {
    pub network_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}
