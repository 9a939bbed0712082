use axum::extract::{Extension, Json};
use uuid::Uuid;

use crate::api::{BookingAPI, DynAPI};
use crate::auth::User;
use crate::entities::{Booking, PassengerBooking};
use crate::error::Error;
use crate::server::extract::PathParam;

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Booking>, Error> {
    let booking = api.find_booking(user, id).await?;

    Ok(booking.into())
}

pub async fn mine(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<Vec<PassengerBooking>>, Error> {
    let bookings = api.list_my_bookings(user).await?;

    Ok(bookings.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Booking>, Error> {
    let booking = api.cancel_booking(user, id).await?;

    Ok(booking.into())
}

pub async fn confirm(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Booking>, Error> {
    let booking = api.confirm_booking(user, id).await?;

    Ok(booking.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Booking>, Error> {
    let booking = api.complete_booking(user, id).await?;

    Ok(booking.into())
}

pub async fn deactivate(
    Extension(api): Extension<DynAPI>,
    user: User,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Booking>, Error> {
    let booking = api.deactivate_booking(user, id).await?;

    Ok(booking.into())
}
