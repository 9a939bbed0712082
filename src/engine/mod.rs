mod booking_api;
mod identity_api;
mod trip_api;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use oso::{Oso, ToPolar};

use crate::{api::API, auth::authorizor, auth::User, error::Error, store::Store};

/// How many times a revision-checked trip write is attempted before the
/// caller gets a conflict.
pub const MAX_EDIT_ATTEMPTS: usize = 3;

pub struct Engine {
    store: Arc<dyn Store>,
    authorizor: Oso,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(store: Arc<dyn Store>) -> Result<Self, Error> {
        Ok(Self {
            store,
            authorizor: authorizor::new()?,
        })
    }
}

impl Engine {
    pub fn authorize<Resource>(
        &self,
        user: User,
        action: &str,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Resource: ToPolar,
    {
        if self.authorizor.is_allowed(user, action.to_string(), resource)? {
            return Ok(());
        }

        tracing::warn!(action, "authorization denied");

        Err(Error::unauthorized_error(format!(
            "you are not allowed to {} here",
            action.replace('_', " ")
        )))
    }

    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

impl API for Engine {}

#[cfg(test)]
mod fixtures {
    use std::sync::Arc;

    use tokio_test::block_on;
    use uuid::Uuid;

    use super::Engine;
    use crate::api::TripAPI;
    use crate::auth::User;
    use crate::entities::{fixtures, BookingRequest, Trip};
    use crate::store::MemoryStore;

    pub struct World {
        pub engine: Engine,
        pub store: Arc<MemoryStore>,
        pub driver: User,
    }

    impl World {
        pub fn new(seat_capacity: i32) -> Self {
            let store = Arc::new(MemoryStore::new());
            let driver = User::new(Uuid::new_v4(), "Laura");
            block_on(store.add_user(driver.clone(), "driver-token"));
            block_on(store.add_vehicle(fixtures::vehicle(driver.id, seat_capacity)));

            let engine = Engine::new(store.clone()).unwrap();

            Self {
                engine,
                store,
                driver,
            }
        }

        pub fn passenger(&self, name: &str) -> User {
            let user = User::new(Uuid::new_v4(), name);
            block_on(self.store.add_user(user.clone(), format!("{}-token", name)));
            user
        }

        pub fn publish(&self, total_seats: i32) -> Trip {
            block_on(
                self.engine
                    .create_trip(self.driver.clone(), fixtures::details(total_seats)),
            )
            .unwrap()
        }
    }

    pub fn request(seats: i32) -> BookingRequest {
        BookingRequest {
            seats,
            pickup: "Portería principal".into(),
        }
    }
}
