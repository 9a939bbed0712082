use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A driver's registered vehicle. Owned by the vehicle registry; the engine
/// only reads it to bound seat counts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub seat_capacity: i32,
    pub active: bool,
}
