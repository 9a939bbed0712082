use std::str::FromStr;

use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Capability;
use crate::entities::{Trip, TripListing};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Uuid,
    pub seats: i32,
    pub pickup: String,
    pub total_price: f64,
    pub status: Status,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Pending and confirmed bookings hold seats and block a second booking
    /// by the same passenger.
    pub fn is_held(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(Error::invalid_input_error(format!(
                "unknown booking status: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BookingRequest {
    pub seats: i32,
    pub pickup: String,
}

impl BookingRequest {
    /// Checks the request shape before any trip lookup happens.
    pub fn validate(&self) -> Result<(), Error> {
        if self.seats < 1 {
            return Err(Error::invalid_input_error(
                "at least one seat must be requested",
            ));
        }
        if self.pickup.trim().is_empty() {
            return Err(Error::invalid_input_error("pickup point is required"));
        }

        Ok(())
    }
}

/// A state change requested on an existing booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Complete,
    Cancel,
    Deactivate,
}

impl Transition {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Deactivate => "deactivate",
        }
    }

    pub fn apply(&self, booking: &mut Booking) -> Result<(), Error> {
        match self {
            Self::Confirm => booking.confirm(),
            Self::Complete => booking.complete(),
            Self::Cancel => booking.cancel(),
            Self::Deactivate => booking.deactivate(),
        }
    }

    pub fn releases_seats(&self) -> bool {
        matches!(self, Self::Cancel)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassengerSummary {
    pub id: Uuid,
    pub name: String,
}

/// A booking as seen by its passenger, with the trip it was made on.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassengerBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub trip: Option<TripListing>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub passenger: Option<PassengerSummary>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripSeats {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: String,
    pub available_seats: i32,
    pub total_seats: i32,
}

impl From<&Trip> for TripSeats {
    fn from(trip: &Trip) -> Self {
        Self {
            id: trip.id,
            origin: trip.origin.clone(),
            destination: trip.destination.clone(),
            departure_time: trip.departure_time.clone(),
            available_seats: trip.available_seats,
            total_seats: trip.total_seats,
        }
    }
}

/// The bookings made on one trip, as seen by its driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripBookings {
    pub trip: TripSeats,
    pub bookings: Vec<TripBooking>,
}

fn price(trip: &Trip, seats: i32) -> f64 {
    trip.fare_per_seat * f64::from(seats)
}

impl Booking {
    pub fn new(trip: &Trip, passenger_id: Uuid, request: &BookingRequest) -> Result<Self, Error> {
        request.validate()?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            trip_id: trip.id,
            passenger_id,
            driver_id: trip.driver_id,
            seats: request.seats,
            pickup: request.pickup.trim().to_string(),
            total_price: price(trip, request.seats),
            status: Status::Pending,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Prices the booking from the fare of `trip` as it stands now.
    pub fn reprice(&mut self, trip: &Trip) {
        self.total_price = price(trip, self.seats);
    }

    pub fn capability(&self, user_id: Uuid) -> Capability {
        if self.passenger_id == user_id {
            Capability::Passenger
        } else if self.driver_id == user_id {
            Capability::Driver
        } else {
            Capability::Unrelated
        }
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn confirm(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.set_status(Status::Confirmed);
                Ok(())
            }
            other => Err(Error::invalid_invocation_error(format!(
                "booking is {}, only pending bookings can be confirmed",
                other.name()
            ))),
        }
    }

    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Confirmed => {
                self.set_status(Status::Completed);
                Ok(())
            }
            _ => Err(Error::invalid_invocation_error(
                "only confirmed bookings can be completed",
            )),
        }
    }

    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn cancel(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending | Status::Confirmed => {
                self.set_status(Status::Cancelled);
                Ok(())
            }
            Status::Cancelled => Err(Error::invalid_invocation_error(
                "booking is already cancelled",
            )),
            Status::Completed => Err(Error::invalid_invocation_error(
                "a completed booking cannot be cancelled",
            )),
        }
    }

    #[tracing::instrument(skip(self), fields(booking_id = %self.id))]
    pub fn deactivate(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Cancelled | Status::Completed => {
                self.active = false;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(Error::invalid_invocation_error(
                "only cancelled or completed bookings can be deleted, cancel it first",
            )),
        }
    }
}

impl PolarClass for Booking {
    fn get_polar_class_builder() -> oso::ClassBuilder<Booking> {
        oso::Class::builder()
            .name("Booking")
            .add_attribute_getter("id", |recv: &Booking| recv.id)
            .add_attribute_getter("status", |recv: &Booking| recv.status.name().to_string())
            .add_method("capability", |recv: &Booking, user_id: Uuid| {
                recv.capability(user_id).name().to_string()
            })
    }

    fn get_polar_class() -> oso::Class {
        let builder = Booking::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
fn booking(seats: i32) -> (Trip, Booking) {
    let trip = crate::entities::trip::fixtures::trip(4);
    let request = BookingRequest {
        seats,
        pickup: " Calle 72 ".into(),
    };
    let booking = Booking::new(&trip, Uuid::new_v4(), &request).unwrap();
    (trip, booking)
}

#[test]
fn new_booking_is_pending_and_priced_from_trip_fare() {
    let (trip, booking) = booking(3);

    assert_eq!(booking.status, Status::Pending);
    assert_eq!(booking.total_price, 15000.0);
    assert_eq!(booking.pickup, "Calle 72");
    assert_eq!(booking.driver_id, trip.driver_id);
}

#[test]
fn request_validation() {
    let request = BookingRequest {
        seats: 0,
        pickup: "Calle 72".into(),
    };
    assert!(request.validate().is_err());

    let request = BookingRequest {
        seats: 1,
        pickup: "  ".into(),
    };
    assert!(request.validate().is_err());
}

#[test]
fn booking_state_machine() {
    let (_, mut booking) = booking(1);

    assert!(booking.complete().unwrap_err().is_conflict_error());
    booking.confirm().unwrap();
    assert!(booking.confirm().unwrap_err().is_conflict_error());
    booking.complete().unwrap();
    assert_eq!(booking.status, Status::Completed);
    assert!(booking.cancel().unwrap_err().is_conflict_error());
}

#[test]
fn cancelling_twice_is_a_conflict() {
    let (_, mut booking) = booking(1);

    booking.cancel().unwrap();
    let err = booking.cancel().unwrap_err();
    assert!(err.is_conflict_error());
    assert_eq!(err.message, "booking is already cancelled");
}

#[test]
fn deactivation_only_from_terminal_states() {
    let (_, mut booking) = booking(1);

    assert!(booking.deactivate().unwrap_err().is_conflict_error());
    assert!(booking.active);

    booking.cancel().unwrap();
    booking.deactivate().unwrap();
    assert!(!booking.active);
}

#[test]
fn capability_is_computed_from_owning_ids() {
    let (trip, booking) = booking(1);

    assert_eq!(booking.capability(booking.passenger_id), Capability::Passenger);
    assert_eq!(booking.capability(trip.driver_id), Capability::Driver);
    assert_eq!(booking.capability(Uuid::new_v4()), Capability::Unrelated);
}
