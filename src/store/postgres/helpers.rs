use super::Database;

use sqlx::{postgres::PgRow, Row, Transaction};
use uuid::Uuid;

use crate::{
    auth::User,
    entities::{Booking, BookingStatus, Trip, TripStatus, Vehicle},
    error::Error,
};

pub const HELD_STATUSES: &str = "('pending', 'confirmed')";

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(e) => e.code().as_deref() == Some("23505"),
        _ => false,
    }
}

pub fn trip_from_row(row: &PgRow) -> Result<Trip, Error> {
    let status: String = row.try_get("status")?;

    Ok(Trip {
        id: row.try_get("id")?,
        driver_id: row.try_get("driver_id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        route: row.try_get("route")?,
        departure_date: row.try_get("departure_date")?,
        departure_time: row.try_get("departure_time")?,
        total_seats: row.try_get("total_seats")?,
        available_seats: row.try_get("available_seats")?,
        fare_per_seat: row.try_get("fare_per_seat")?,
        status: status
            .parse::<TripStatus>()
            .map_err(Error::unexpected_error)?,
        active: row.try_get("active")?,
        revision: row.try_get("revision")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn booking_from_row(row: &PgRow) -> Result<Booking, Error> {
    let status: String = row.try_get("status")?;

    Ok(Booking {
        id: row.try_get("id")?,
        trip_id: row.try_get("trip_id")?,
        passenger_id: row.try_get("passenger_id")?,
        driver_id: row.try_get("driver_id")?,
        seats: row.try_get("seats")?,
        pickup: row.try_get("pickup")?,
        total_price: row.try_get("total_price")?,
        status: status
            .parse::<BookingStatus>()
            .map_err(Error::unexpected_error)?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn vehicle_from_row(row: &PgRow) -> Result<Vehicle, Error> {
    Ok(Vehicle {
        id: row.try_get("id")?,
        driver_id: row.try_get("driver_id")?,
        plate: row.try_get("plate")?,
        brand: row.try_get("brand")?,
        model: row.try_get("model")?,
        seat_capacity: row.try_get("seat_capacity")?,
        active: row.try_get("active")?,
    })
}

pub fn user_from_row(row: &PgRow) -> Result<User, Error> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        active: row.try_get("active")?,
    })
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_trip_for_update(
    tx: &mut Transaction<'_, Database>,
    id: Uuid,
) -> Result<Trip, Error> {
    let row = sqlx::query("SELECT * FROM trips WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found_error("trip not found"))?;

    trip_from_row(&row)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_booking_for_update(
    tx: &mut Transaction<'_, Database>,
    id: Uuid,
) -> Result<Booking, Error> {
    let row = sqlx::query("SELECT * FROM bookings WHERE id = $1 AND active FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found_error("booking not found"))?;

    booking_from_row(&row)
}

/// Writes every mutable column of a trip that the caller holds locked.
#[tracing::instrument(skip(tx, trip), fields(trip_id = %trip.id))]
pub async fn write_trip(tx: &mut Transaction<'_, Database>, trip: &Trip) -> Result<(), Error> {
    sqlx::query(
        "UPDATE trips SET
            origin = $2, destination = $3, route = $4, departure_date = $5,
            departure_time = $6, total_seats = $7, available_seats = $8,
            fare_per_seat = $9, status = $10, active = $11, revision = $12,
            updated_at = $13
        WHERE id = $1",
    )
    .bind(trip.id)
    .bind(&trip.origin)
    .bind(&trip.destination)
    .bind(&trip.route)
    .bind(trip.departure_date)
    .bind(&trip.departure_time)
    .bind(trip.total_seats)
    .bind(trip.available_seats)
    .bind(trip.fare_per_seat)
    .bind(trip.status.name())
    .bind(trip.active)
    .bind(trip.revision)
    .bind(trip.updated_at)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, booking), fields(booking_id = %booking.id))]
pub async fn write_booking(
    tx: &mut Transaction<'_, Database>,
    booking: &Booking,
) -> Result<(), Error> {
    sqlx::query("UPDATE bookings SET status = $2, active = $3, updated_at = $4 WHERE id = $1")
        .bind(booking.id)
        .bind(booking.status.name())
        .bind(booking.active)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

    Ok(())
}
