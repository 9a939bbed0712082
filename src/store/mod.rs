//! Persistence traits consumed by the engine.
//!
//! Every mutating method is one atomic unit at the store boundary. The engine
//! never combines a read and a write across two calls and assumes nothing
//! changed in between. Where it does read first, it is only to produce a
//! precise error, and the store re-checks the condition when it writes.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Booking, Transition, Trip, TripFilter, Vehicle};
use crate::error::Error;

#[async_trait]
pub trait TripStore: Send + Sync {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), Error>;

    /// Returns the trip even when it has been deactivated.
    async fn find_trip(&self, id: Uuid) -> Result<Option<Trip>, Error>;

    /// Active trips matching `filter`, ordered by departure date then time.
    async fn list_trips(&self, filter: &TripFilter) -> Result<Vec<Trip>, Error>;

    /// Active trips of one driver, latest departure first.
    async fn list_driver_trips(&self, driver_id: Uuid) -> Result<Vec<Trip>, Error>;

    /// Writes `trip` only if the stored revision still equals `trip.revision`.
    /// Returns the stored trip with its new revision, or `None` when stale.
    async fn update_trip(&self, trip: &Trip) -> Result<Option<Trip>, Error>;

    /// Cancels the trip and every pending or confirmed booking on it as one
    /// unit. Returns the cancelled trip and the number of bookings cancelled.
    async fn cancel_trip(&self, id: Uuid) -> Result<(Trip, u64), Error>;

    /// Soft-deletes the trip unless a pending or confirmed booking exists.
    async fn deactivate_trip(&self, id: Uuid) -> Result<Trip, Error>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Reserves `booking.seats` on its trip and inserts the booking as one
    /// unit. The reservation only succeeds on an open trip with enough seats,
    /// and the insert fails if the passenger already holds a booking on it.
    /// The booking is priced from the fare of the trip row it reserved on.
    async fn place_booking(&self, booking: &mut Booking) -> Result<Trip, Error>;

    /// Returns the booking even when it has been deactivated.
    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, Error>;

    /// The passenger's pending or confirmed booking on a trip, if any.
    async fn find_held_booking(
        &self,
        trip_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<Option<Booking>, Error>;

    /// Active bookings of a passenger, newest first.
    async fn list_passenger_bookings(&self, passenger_id: Uuid) -> Result<Vec<Booking>, Error>;

    /// Active bookings on a trip, newest first.
    async fn list_trip_bookings(&self, trip_id: Uuid) -> Result<Vec<Booking>, Error>;

    /// Applies `transition` to an active booking. A cancellation also
    /// releases its seats on the trip in the same unit; the updated trip is
    /// returned when that happened.
    async fn transition_booking(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<(Booking, Option<Trip>), Error>;
}

#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    async fn find_driver_vehicle(&self, driver_id: Uuid) -> Result<Option<Vehicle>, Error>;
    async fn find_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, Error>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn find_session_user(&self, token: &str) -> Result<Option<User>, Error>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, Error>;
}

pub trait Store: TripStore + BookingStore + VehicleRegistry + IdentityProvider {}

impl<T> Store for T where T: TripStore + BookingStore + VehicleRegistry + IdentityProvider {}
