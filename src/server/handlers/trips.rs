use axum::extract::{Extension, Json};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::api::{BookingAPI, DynAPI, TripAPI};
use crate::auth::User;
use crate::entities::{
    Booking, BookingRequest, DriverTrip, Trip, TripBookings, TripCancellation, TripDetails,
    TripFilter, TripListing, TripPatch,
};
use crate::error::Error;
use crate::server::extract::{PathParam, Payload, QueryParams};

pub async fn list(
    Extension(api): Extension<DynAPI>,
    QueryParams(filter): QueryParams<TripFilter>,
) -> Result<Json<Vec<TripListing>>, Error> {
    let trips = api.list_trips(filter).await?;

    Ok(trips.into())
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Payload(details): Payload<TripDetails>,
) -> Result<(StatusCode, Json<Trip>), Error> {
    let trip = api.create_trip(user, details).await?;

    Ok((StatusCode::CREATED, trip.into()))
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<TripListing>, Error> {
    let trip = api.find_trip(id).await?;

    Ok(trip.into())
}

pub async fn mine(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Vec<DriverTrip>>, Error> {
    let trips = api.list_my_trips(user).await?;

    Ok(trips.into())
}

pub async fn edit(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
    Payload(patch): Payload<TripPatch>,
) -> Result<Json<Trip>, Error> {
    let trip = api.edit_trip(user, id, patch).await?;

    Ok(trip.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<TripCancellation>, Error> {
    let cancellation = api.cancel_trip(user, id).await?;

    Ok(cancellation.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.start_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn finish(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.finish_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn deactivate(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Trip>, Error> {
    let trip = api.deactivate_trip(user, id).await?;

    Ok(trip.into())
}

pub async fn book(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
    Payload(request): Payload<BookingRequest>,
) -> Result<(StatusCode, Json<Booking>), Error> {
    let booking = api.create_booking(user, id, request).await?;

    Ok((StatusCode::CREATED, booking.into()))
}

pub async fn bookings(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<TripBookings>, Error> {
    let bookings = api.list_trip_bookings(user, id).await?;

    Ok(bookings.into())
}
