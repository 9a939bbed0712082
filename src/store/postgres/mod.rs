mod helpers;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Executor, Pool, Postgres, Row};
use uuid::Uuid;

use self::helpers::{
    booking_from_row, fetch_booking_for_update, fetch_trip_for_update, is_unique_violation,
    trip_from_row, user_from_row, vehicle_from_row, write_booking, write_trip, HELD_STATUSES,
};
use super::{BookingStore, IdentityProvider, TripStore, VehicleRegistry};
use crate::{
    auth::User,
    entities::{Booking, Transition, Trip, TripFilter, Vehicle},
    error::Error,
};

type Database = Postgres;

pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip_all)]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        // TODO: move this to migrations
        let mut tx = pool.begin().await?;

        // stores booting side by side must not race on the DDL below
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('carpool_schema'))")
            .execute(&mut tx)
            .await?;

        // users, sessions and vehicles are owned by the identity and vehicle
        // services; the tables only exist here so a fresh database can boot.
        tx.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                name VARCHAR NOT NULL,
                role VARCHAR NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE
            )",
        )
        .await?;
        tx.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                token VARCHAR PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id)
            )",
        )
        .await?;
        tx.execute(
            "CREATE TABLE IF NOT EXISTS vehicles (
                id UUID PRIMARY KEY,
                driver_id UUID NOT NULL REFERENCES users(id),
                plate VARCHAR NOT NULL,
                brand VARCHAR NOT NULL,
                model VARCHAR NOT NULL,
                seat_capacity INT4 NOT NULL CHECK (seat_capacity > 0),
                active BOOLEAN NOT NULL DEFAULT TRUE
            )",
        )
        .await?;
        tx.execute(
            "CREATE TABLE IF NOT EXISTS trips (
                id UUID PRIMARY KEY,
                driver_id UUID NOT NULL,
                vehicle_id UUID NOT NULL,
                origin VARCHAR NOT NULL,
                destination VARCHAR NOT NULL,
                route VARCHAR,
                departure_date DATE NOT NULL,
                departure_time VARCHAR NOT NULL,
                total_seats INT4 NOT NULL,
                available_seats INT4 NOT NULL,
                fare_per_seat FLOAT8 NOT NULL,
                status VARCHAR NOT NULL,
                active BOOLEAN NOT NULL,
                revision INT8 NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CHECK (available_seats >= 0 AND available_seats <= total_seats)
            )",
        )
        .await?;
        tx.execute(
            "CREATE TABLE IF NOT EXISTS bookings (
                id UUID PRIMARY KEY,
                trip_id UUID NOT NULL REFERENCES trips(id),
                passenger_id UUID NOT NULL,
                driver_id UUID NOT NULL,
                seats INT4 NOT NULL CHECK (seats > 0),
                pickup VARCHAR NOT NULL,
                total_price FLOAT8 NOT NULL,
                status VARCHAR NOT NULL,
                active BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
        )
        .await?;
        tx.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS bookings_one_held_per_passenger
                ON bookings (trip_id, passenger_id)
                WHERE status IN ('pending', 'confirmed')",
        )
        .await?;

        tx.commit().await?;

        Ok(Self { pool })
    }

    /// Registers a user reachable through `token`. Used to seed a database
    /// that has no identity service in front of it.
    #[tracing::instrument(skip(self, user, token), fields(user_id = %user.id))]
    pub async fn add_user(&self, user: &User, token: &str) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, name, role, active) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = $2, role = $3, active = $4",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.active)
        .execute(&mut tx)
        .await?;

        sqlx::query(
            "INSERT INTO sessions (token, user_id) VALUES ($1, $2)
            ON CONFLICT (token) DO UPDATE SET user_id = $2",
        )
        .bind(token)
        .bind(user.id)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, vehicle), fields(vehicle_id = %vehicle.id))]
    pub async fn add_vehicle(&self, vehicle: &Vehicle) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO vehicles (id, driver_id, plate, brand, model, seat_capacity, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(vehicle.id)
        .bind(vehicle.driver_id)
        .bind(&vehicle.plate)
        .bind(&vehicle.brand)
        .bind(&vehicle.model)
        .bind(vehicle.seat_capacity)
        .bind(vehicle.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Works out why the conditional seat reservation matched no row.
    async fn rejected_reservation(&self, booking: &Booking) -> Result<Error, Error> {
        let trip = match self.find_trip(booking.trip_id).await? {
            Some(trip) if trip.active => trip,
            _ => return Ok(Error::not_found_error("trip not found")),
        };

        let mut probe = trip.clone();
        match probe.reserve(booking.seats) {
            Err(err) => Ok(err),
            Ok(()) => Ok(Error::invalid_invocation_error(
                "trip changed while booking, try again",
            )),
        }
    }
}

#[async_trait]
impl TripStore for PgStore {
    #[tracing::instrument(skip(self, trip), fields(trip_id = %trip.id))]
    async fn insert_trip(&self, trip: &Trip) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO trips (
                id, driver_id, vehicle_id, origin, destination, route, departure_date,
                departure_time, total_seats, available_seats, fare_per_seat, status,
                active, revision, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(trip.id)
        .bind(trip.driver_id)
        .bind(trip.vehicle_id)
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
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_trip(&self, id: Uuid) -> Result<Option<Trip>, Error> {
        let row = sqlx::query("SELECT * FROM trips WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(trip_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_trips(&self, filter: &TripFilter) -> Result<Vec<Trip>, Error> {
        let rows = sqlx::query(
            "SELECT * FROM trips
            WHERE
                active
                AND status = $1
                AND ($2::VARCHAR IS NULL OR strpos(lower(origin), lower($2)) > 0)
                AND ($3::VARCHAR IS NULL OR strpos(lower(destination), lower($3)) > 0)
                AND ($4::DATE IS NULL OR departure_date = $4)
                AND ($5::INT4 IS NULL OR available_seats >= $5)
            ORDER BY departure_date ASC, departure_time ASC",
        )
        .bind(filter.status_or_default().name())
        .bind(&filter.origin)
        .bind(&filter.destination)
        .bind(filter.departure_date)
        .bind(filter.min_seats)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trip_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn list_driver_trips(&self, driver_id: Uuid) -> Result<Vec<Trip>, Error> {
        let rows = sqlx::query(
            "SELECT * FROM trips WHERE driver_id = $1 AND active
            ORDER BY departure_date DESC, departure_time DESC",
        )
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trip_from_row).collect()
    }

    #[tracing::instrument(skip(self, trip), fields(trip_id = %trip.id, revision = trip.revision))]
    async fn update_trip(&self, trip: &Trip) -> Result<Option<Trip>, Error> {
        let row = sqlx::query(
            "UPDATE trips SET
                origin = $3, destination = $4, route = $5, departure_date = $6,
                departure_time = $7, total_seats = $8, available_seats = $9,
                fare_per_seat = $10, status = $11, active = $12,
                revision = revision + 1, updated_at = $13
            WHERE id = $1 AND revision = $2
            RETURNING *",
        )
        .bind(trip.id)
        .bind(trip.revision)
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
        .bind(trip.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => trip_from_row(&row).map(Some),
            None => match self.find_trip(trip.id).await? {
                Some(_) => {
                    tracing::info!("stale trip revision, nothing written");
                    Ok(None)
                }
                None => Err(Error::not_found_error("trip not found")),
            },
        }
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_trip(&self, id: Uuid) -> Result<(Trip, u64), Error> {
        let mut tx = self.pool.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, id).await?;
        if !trip.active {
            return Err(Error::not_found_error("trip not found"));
        }

        trip.cancel()?;
        trip.revision += 1;
        write_trip(&mut tx, &trip).await?;

        let cancelled = sqlx::query(&format!(
            "UPDATE bookings SET status = 'cancelled', updated_at = now()
            WHERE trip_id = $1 AND status IN {}",
            HELD_STATUSES
        ))
        .bind(id)
        .execute(&mut tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::info!(cancelled, "trip cancelled");

        Ok((trip, cancelled))
    }

    #[tracing::instrument(skip(self))]
    async fn deactivate_trip(&self, id: Uuid) -> Result<Trip, Error> {
        let mut tx = self.pool.begin().await?;

        // the trip row lock serializes this check with concurrent reservations
        let mut trip = fetch_trip_for_update(&mut tx, id).await?;

        let held: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS held FROM bookings WHERE trip_id = $1 AND status IN {}",
            HELD_STATUSES
        ))
        .bind(id)
        .fetch_one(&mut tx)
        .await?
        .try_get("held")?;

        trip.deactivate(held)?;
        trip.revision += 1;
        write_trip(&mut tx, &trip).await?;

        tx.commit().await?;

        Ok(trip)
    }
}

#[async_trait]
impl BookingStore for PgStore {
    #[tracing::instrument(skip(self, booking), fields(booking_id = %booking.id, trip_id = %booking.trip_id))]
    async fn place_booking(&self, booking: &mut Booking) -> Result<Trip, Error> {
        let mut tx = self.pool.begin().await?;

        let reserved = sqlx::query(
            "UPDATE trips SET
                available_seats = available_seats - $2,
                status = CASE WHEN available_seats - $2 = 0 THEN 'full' ELSE status END,
                revision = revision + 1,
                updated_at = now()
            WHERE id = $1 AND active AND status = 'open' AND available_seats >= $2
            RETURNING *",
        )
        .bind(booking.trip_id)
        .bind(booking.seats)
        .fetch_optional(&mut tx)
        .await?;

        let trip = match reserved {
            Some(row) => trip_from_row(&row)?,
            None => {
                tx.rollback().await?;
                tracing::info!("seat reservation rejected");
                return Err(self.rejected_reservation(booking).await?);
            }
        };

        booking.reprice(&trip);

        let inserted = sqlx::query(
            "INSERT INTO bookings (
                id, trip_id, passenger_id, driver_id, seats, pickup, total_price,
                status, active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(booking.passenger_id)
        .bind(booking.driver_id)
        .bind(booking.seats)
        .bind(&booking.pickup)
        .bind(booking.total_price)
        .bind(booking.status.name())
        .bind(booking.active)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut tx)
        .await;

        match inserted {
            Ok(_) => (),
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                return Err(Error::invalid_invocation_error(
                    "you already have a booking on this trip",
                ));
            }
            Err(err) => return Err(err.into()),
        }

        tx.commit().await?;

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, Error> {
        let row = sqlx::query("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(booking_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn find_held_booking(
        &self,
        trip_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<Option<Booking>, Error> {
        let row = sqlx::query(&format!(
            "SELECT * FROM bookings WHERE trip_id = $1 AND passenger_id = $2 AND status IN {}",
            HELD_STATUSES
        ))
        .bind(trip_id)
        .bind(passenger_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(booking_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_passenger_bookings(&self, passenger_id: Uuid) -> Result<Vec<Booking>, Error> {
        let rows = sqlx::query(
            "SELECT * FROM bookings WHERE passenger_id = $1 AND active ORDER BY created_at DESC",
        )
        .bind(passenger_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn list_trip_bookings(&self, trip_id: Uuid) -> Result<Vec<Booking>, Error> {
        let rows = sqlx::query(
            "SELECT * FROM bookings WHERE trip_id = $1 AND active ORDER BY created_at DESC",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn transition_booking(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<(Booking, Option<Trip>), Error> {
        // locks are always taken trip first, then booking
        let trip_id = match self.find_booking(id).await? {
            Some(booking) if booking.active => booking.trip_id,
            _ => return Err(Error::not_found_error("booking not found")),
        };

        let mut tx = self.pool.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, trip_id).await?;
        let mut booking = fetch_booking_for_update(&mut tx, id).await?;

        transition.apply(&mut booking)?;
        write_booking(&mut tx, &booking).await?;

        let mut released = None;
        if transition.releases_seats() && trip.release(booking.seats) {
            trip.revision += 1;
            write_trip(&mut tx, &trip).await?;
            released = Some(trip);
        }

        tx.commit().await?;

        Ok((booking, released))
    }
}

#[async_trait]
impl VehicleRegistry for PgStore {
    #[tracing::instrument(skip(self))]
    async fn find_driver_vehicle(&self, driver_id: Uuid) -> Result<Option<Vehicle>, Error> {
        let row = sqlx::query(
            "SELECT * FROM vehicles WHERE driver_id = $1 ORDER BY active DESC LIMIT 1",
        )
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(vehicle_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn find_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, Error> {
        let row = sqlx::query("SELECT * FROM vehicles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(vehicle_from_row).transpose()
    }
}

#[async_trait]
impl IdentityProvider for PgStore {
    #[tracing::instrument(skip_all)]
    async fn find_session_user(&self, token: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query(
            "SELECT u.* FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}
