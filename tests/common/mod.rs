#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use carpool::api::TripAPI;
use carpool::auth::User;
use carpool::engine::Engine;
use carpool::entities::{
    Booking, BookingRequest, BookingStatus, Trip, TripDetails, TripStatus, Vehicle,
};
use carpool::store::{BookingStore, MemoryStore, PgStore, Store, TripStore};

/// Where a `World` keeps its data. Postgres is only exercised when
/// `DATABASE_URL` points at a database the tests may write to.
#[derive(Clone, Debug)]
pub enum Backend {
    Memory,
    Postgres(String),
}

pub fn backends() -> Vec<Backend> {
    let mut backends = vec![Backend::Memory];
    if let Ok(url) = env::var("DATABASE_URL") {
        backends.push(Backend::Postgres(url));
    }
    backends
}

enum Seeder {
    Memory(Arc<MemoryStore>),
    Postgres(Arc<PgStore>),
}

impl Seeder {
    async fn add_user(&self, user: &User) {
        let token = format!("{}-token", user.id);
        match self {
            Self::Memory(store) => store.add_user(user.clone(), token).await,
            Self::Postgres(store) => store.add_user(user, &token).await.unwrap(),
        }
    }

    async fn add_vehicle(&self, vehicle: Vehicle) {
        match self {
            Self::Memory(store) => store.add_vehicle(vehicle).await,
            Self::Postgres(store) => store.add_vehicle(&vehicle).await.unwrap(),
        }
    }
}

pub struct World {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn Store>,
    pub driver: User,
    seeder: Seeder,
}

impl World {
    pub async fn new(seat_capacity: i32) -> Self {
        Self::on(&Backend::Memory, seat_capacity).await
    }

    pub async fn on(backend: &Backend, seat_capacity: i32) -> Self {
        let (store, seeder): (Arc<dyn Store>, Seeder) = match backend {
            Backend::Memory => {
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn Store>, Seeder::Memory(store))
            }
            Backend::Postgres(url) => {
                let store = Arc::new(PgStore::new(url, 8).await.unwrap());
                (store.clone() as Arc<dyn Store>, Seeder::Postgres(store))
            }
        };

        let driver = User::new(Uuid::new_v4(), "Laura");
        seeder.add_user(&driver).await;
        seeder
            .add_vehicle(Vehicle {
                id: Uuid::new_v4(),
                driver_id: driver.id,
                plate: "KLM482".into(),
                brand: "Chevrolet".into(),
                model: "Spark".into(),
                seat_capacity,
                active: true,
            })
            .await;

        let engine = Arc::new(Engine::new(store.clone()).unwrap());

        Self {
            engine,
            store,
            driver,
            seeder,
        }
    }

    pub async fn passenger(&self, name: &str) -> User {
        let user = User::new(Uuid::new_v4(), name);
        self.seeder.add_user(&user).await;
        user
    }

    pub async fn publish(&self, total_seats: i32) -> Trip {
        let details = TripDetails {
            origin: Some("Campus Norte".into()),
            destination: Some("Chapinero".into()),
            route: None,
            departure_date: Some(Utc::now().date_naive() + Duration::days(2)),
            departure_time: Some("06:45".into()),
            total_seats: Some(total_seats),
            fare_per_seat: Some(4500.0),
        };

        self.engine
            .create_trip(self.driver.clone(), details)
            .await
            .unwrap()
    }

    pub async fn trip(&self, id: Uuid) -> Trip {
        self.store.find_trip(id).await.unwrap().unwrap()
    }

    pub async fn bookings(&self, ids: &[Uuid]) -> Vec<Booking> {
        let mut bookings = Vec::with_capacity(ids.len());
        for id in ids {
            bookings.push(self.store.find_booking(*id).await.unwrap().unwrap());
        }
        bookings
    }

    /// Seats still bound to the trip: held bookings plus the ones that
    /// completed.
    pub async fn occupied_seats(&self, trip_id: Uuid) -> i32 {
        let mut occupied = 0;
        for booking in self.store.list_trip_bookings(trip_id).await.unwrap() {
            if booking.status != BookingStatus::Cancelled {
                occupied += booking.seats;
            }
        }
        occupied
    }
}

pub fn request(seats: i32) -> BookingRequest {
    BookingRequest {
        seats,
        pickup: "Calle 100 con 15".into(),
    }
}

pub fn counts_seats(status: TripStatus) -> bool {
    matches!(
        status,
        TripStatus::Open | TripStatus::Full | TripStatus::InProgress
    )
}
