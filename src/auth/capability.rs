use serde::{Deserialize, Serialize};

/// How a requester relates to a trip or booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Driver,
    Passenger,
    #[serde(rename = "none")]
    Unrelated,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Passenger => "passenger",
            Self::Unrelated => "none",
        }
    }
}
