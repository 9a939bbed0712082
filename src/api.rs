use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{
    Booking, BookingRequest, DriverTrip, PassengerBooking, Trip, TripBookings, TripCancellation,
    TripDetails, TripFilter, TripListing, TripPatch,
};
use crate::error::Error;

#[async_trait]
pub trait IdentityAPI {
    /// Resolves a bearer token to an active user.
    async fn authenticate(&self, token: &str) -> Result<User, Error>;
}

#[async_trait]
pub trait TripAPI {
    async fn create_trip(&self, user: User, details: TripDetails) -> Result<Trip, Error>;
    async fn list_trips(&self, filter: TripFilter) -> Result<Vec<TripListing>, Error>;
    async fn find_trip(&self, id: Uuid) -> Result<TripListing, Error>;
    async fn list_my_trips(&self, user: User) -> Result<Vec<DriverTrip>, Error>;
    async fn edit_trip(&self, user: User, id: Uuid, patch: TripPatch) -> Result<Trip, Error>;
    async fn cancel_trip(&self, user: User, id: Uuid) -> Result<TripCancellation, Error>;
    async fn start_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn finish_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn deactivate_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
}

#[async_trait]
pub trait BookingAPI {
    async fn create_booking(
        &self,
        user: User,
        trip_id: Uuid,
        request: BookingRequest,
    ) -> Result<Booking, Error>;
    async fn cancel_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn confirm_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn complete_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn deactivate_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn list_my_bookings(&self, user: User) -> Result<Vec<PassengerBooking>, Error>;
    async fn list_trip_bookings(&self, user: User, trip_id: Uuid) -> Result<TripBookings, Error>;
    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
}

pub trait API: IdentityAPI + TripAPI + BookingAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
