use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BookingStore, IdentityProvider, TripStore, VehicleRegistry};
use crate::auth::User;
use crate::entities::{Booking, Transition, Trip, TripFilter, Vehicle};
use crate::error::Error;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Uuid>,
    vehicles: HashMap<Uuid, Vehicle>,
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<Uuid, Booking>,
}

/// Store kept entirely in process memory. Each operation runs under one lock,
/// which makes every trait method a single atomic unit.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn trip_not_found() -> Error {
    Error::not_found_error("trip not found")
}

fn booking_not_found() -> Error {
    Error::not_found_error("booking not found")
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user reachable through `token`.
    pub async fn add_user(&self, user: User, token: impl Into<String>) {
        let mut tables = self.tables.lock().await;
        tables.sessions.insert(token.into(), user.id);
        tables.users.insert(user.id, user);
    }

    pub async fn add_vehicle(&self, vehicle: Vehicle) {
        let mut tables = self.tables.lock().await;
        tables.vehicles.insert(vehicle.id, vehicle);
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), Error> {
        let mut tables = self.tables.lock().await;
        tables.trips.insert(trip.id, trip.clone());

        Ok(())
    }

    async fn find_trip(&self, id: Uuid) -> Result<Option<Trip>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables.trips.get(&id).cloned())
    }

    async fn list_trips(&self, filter: &TripFilter) -> Result<Vec<Trip>, Error> {
        let tables = self.tables.lock().await;

        let mut trips: Vec<Trip> = tables
            .trips
            .values()
            .filter(|trip| filter.matches(trip))
            .cloned()
            .collect();
        trips.sort_by(|a, b| {
            (a.departure_date, &a.departure_time).cmp(&(b.departure_date, &b.departure_time))
        });

        Ok(trips)
    }

    async fn list_driver_trips(&self, driver_id: Uuid) -> Result<Vec<Trip>, Error> {
        let tables = self.tables.lock().await;

        let mut trips: Vec<Trip> = tables
            .trips
            .values()
            .filter(|trip| trip.active && trip.driver_id == driver_id)
            .cloned()
            .collect();
        trips.sort_by(|a, b| {
            (b.departure_date, &b.departure_time).cmp(&(a.departure_date, &a.departure_time))
        });

        Ok(trips)
    }

    async fn update_trip(&self, trip: &Trip) -> Result<Option<Trip>, Error> {
        let mut tables = self.tables.lock().await;

        match tables.trips.get_mut(&trip.id) {
            Some(stored) if stored.revision == trip.revision => {
                let mut next = trip.clone();
                next.revision += 1;
                *stored = next.clone();
                Ok(Some(next))
            }
            Some(_) => Ok(None),
            None => Err(trip_not_found()),
        }
    }

    async fn cancel_trip(&self, id: Uuid) -> Result<(Trip, u64), Error> {
        let mut tables = self.tables.lock().await;
        let Tables {
            trips, bookings, ..
        } = &mut *tables;

        let trip = trips
            .get_mut(&id)
            .filter(|trip| trip.active)
            .ok_or_else(trip_not_found)?;

        trip.cancel()?;
        trip.revision += 1;

        let mut cancelled = 0;
        for booking in bookings
            .values_mut()
            .filter(|booking| booking.trip_id == id && booking.status.is_held())
        {
            booking.cancel()?;
            cancelled += 1;
        }

        Ok((trip.clone(), cancelled))
    }

    async fn deactivate_trip(&self, id: Uuid) -> Result<Trip, Error> {
        let mut tables = self.tables.lock().await;
        let Tables {
            trips, bookings, ..
        } = &mut *tables;

        let held = bookings
            .values()
            .filter(|booking| booking.trip_id == id && booking.status.is_held())
            .count() as i64;

        let trip = trips.get_mut(&id).ok_or_else(trip_not_found)?;
        trip.deactivate(held)?;
        trip.revision += 1;

        Ok(trip.clone())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn place_booking(&self, booking: &mut Booking) -> Result<Trip, Error> {
        let mut tables = self.tables.lock().await;
        let Tables {
            trips, bookings, ..
        } = &mut *tables;

        let trip = trips
            .get_mut(&booking.trip_id)
            .filter(|trip| trip.active)
            .ok_or_else(trip_not_found)?;

        let duplicate = bookings.values().any(|existing| {
            existing.trip_id == booking.trip_id
                && existing.passenger_id == booking.passenger_id
                && existing.status.is_held()
        });
        if duplicate {
            return Err(Error::invalid_invocation_error(
                "you already have a booking on this trip",
            ));
        }

        trip.reserve(booking.seats)?;
        trip.revision += 1;
        booking.reprice(trip);

        bookings.insert(booking.id, booking.clone());

        Ok(trip.clone())
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables.bookings.get(&id).cloned())
    }

    async fn find_held_booking(
        &self,
        trip_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<Option<Booking>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables
            .bookings
            .values()
            .find(|booking| {
                booking.trip_id == trip_id
                    && booking.passenger_id == passenger_id
                    && booking.status.is_held()
            })
            .cloned())
    }

    async fn list_passenger_bookings(&self, passenger_id: Uuid) -> Result<Vec<Booking>, Error> {
        let tables = self.tables.lock().await;

        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|booking| booking.active && booking.passenger_id == passenger_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(bookings)
    }

    async fn list_trip_bookings(&self, trip_id: Uuid) -> Result<Vec<Booking>, Error> {
        let tables = self.tables.lock().await;

        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|booking| booking.active && booking.trip_id == trip_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(bookings)
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<(Booking, Option<Trip>), Error> {
        let mut tables = self.tables.lock().await;
        let Tables {
            trips, bookings, ..
        } = &mut *tables;

        let stored = bookings
            .get_mut(&id)
            .filter(|booking| booking.active)
            .ok_or_else(booking_not_found)?;

        let mut booking = stored.clone();
        transition.apply(&mut booking)?;

        let mut released = None;
        if transition.releases_seats() {
            if let Some(trip) = trips.get_mut(&booking.trip_id) {
                if trip.release(booking.seats) {
                    trip.revision += 1;
                    released = Some(trip.clone());
                }
            }
        }

        *stored = booking.clone();

        Ok((booking, released))
    }
}

#[async_trait]
impl VehicleRegistry for MemoryStore {
    async fn find_driver_vehicle(&self, driver_id: Uuid) -> Result<Option<Vehicle>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables
            .vehicles
            .values()
            .filter(|vehicle| vehicle.driver_id == driver_id)
            .max_by_key(|vehicle| vehicle.active)
            .cloned())
    }

    async fn find_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables.vehicles.get(&id).cloned())
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn find_session_user(&self, token: &str) -> Result<Option<User>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables
            .sessions
            .get(token)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, Error> {
        let tables = self.tables.lock().await;

        Ok(tables.users.get(&id).cloned())
    }
}

#[test]
fn duplicate_held_booking_is_rejected_without_touching_seats() {
    use crate::entities::{fixtures, BookingRequest};
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let trip = fixtures::trip(4);
    block_on(store.insert_trip(&trip)).unwrap();

    let passenger_id = Uuid::new_v4();
    let request = BookingRequest {
        seats: 1,
        pickup: "Portería 2".into(),
    };

    let mut first = Booking::new(&trip, passenger_id, &request).unwrap();
    let updated = block_on(store.place_booking(&mut first)).unwrap();
    assert_eq!(updated.available_seats, 3);

    let mut second = Booking::new(&trip, passenger_id, &request).unwrap();
    let err = block_on(store.place_booking(&mut second)).unwrap_err();
    assert!(err.is_conflict_error());

    let stored = block_on(store.find_trip(trip.id)).unwrap().unwrap();
    assert_eq!(stored.available_seats, 3);
    assert!(block_on(store.find_booking(second.id)).unwrap().is_none());
}

#[test]
fn stale_revision_is_not_written() {
    use crate::entities::fixtures;
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let trip = fixtures::trip(4);
    block_on(store.insert_trip(&trip)).unwrap();

    let mut first = trip.clone();
    first.origin = "Usaquén".into();
    let written = block_on(store.update_trip(&first)).unwrap().unwrap();
    assert_eq!(written.revision, 1);

    let mut second = trip.clone();
    second.origin = "Suba".into();
    assert!(block_on(store.update_trip(&second)).unwrap().is_none());

    let stored = block_on(store.find_trip(trip.id)).unwrap().unwrap();
    assert_eq!(stored.origin, "Usaquén");
}

#[test]
fn booking_is_priced_from_the_fare_at_reservation() {
    use crate::entities::{fixtures, BookingRequest};
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let trip = fixtures::trip(4);
    block_on(store.insert_trip(&trip)).unwrap();

    let request = BookingRequest {
        seats: 2,
        pickup: "Portería 2".into(),
    };
    let mut booking = Booking::new(&trip, Uuid::new_v4(), &request).unwrap();
    assert_eq!(booking.total_price, 10000.0);

    let mut raised = trip.clone();
    raised.fare_per_seat = 7000.0;
    block_on(store.update_trip(&raised)).unwrap().unwrap();

    block_on(store.place_booking(&mut booking)).unwrap();
    assert_eq!(booking.total_price, 14000.0);

    let stored = block_on(store.find_booking(booking.id)).unwrap().unwrap();
    assert_eq!(stored.total_price, 14000.0);
}

#[test]
fn driver_vehicle_prefers_the_active_one() {
    use crate::entities::fixtures;
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let driver_id = Uuid::new_v4();

    let mut retired = fixtures::vehicle(driver_id, 4);
    retired.active = false;
    let current = fixtures::vehicle(driver_id, 3);
    block_on(store.add_vehicle(retired));
    block_on(store.add_vehicle(current.clone()));

    let found = block_on(store.find_driver_vehicle(driver_id)).unwrap().unwrap();
    assert_eq!(found.id, current.id);
    assert!(found.active);
}
