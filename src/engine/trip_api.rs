use super::{Engine, MAX_EDIT_ATTEMPTS};

use async_trait::async_trait;
use futures::future::try_join_all;
use uuid::Uuid;

use crate::{
    api::TripAPI,
    auth::User,
    entities::{
        DriverSummary, DriverTrip, Trip, TripCancellation, TripDetails, TripFilter, TripListing,
        TripPatch, VehicleSummary,
    },
    error::Error,
};

impl Engine {
    pub(super) async fn find_active_trip(&self, id: Uuid) -> Result<Trip, Error> {
        match self.store.find_trip(id).await? {
            Some(trip) if trip.active => Ok(trip),
            _ => Err(Error::not_found_error("trip not found")),
        }
    }

    pub(super) async fn trip_listing(&self, trip: Trip) -> Result<TripListing, Error> {
        let driver = self
            .store
            .find_user(trip.driver_id)
            .await?
            .map(|user| DriverSummary {
                id: user.id,
                name: user.name,
            });
        let vehicle = self
            .store
            .find_vehicle(trip.vehicle_id)
            .await?
            .as_ref()
            .map(VehicleSummary::from);

        Ok(TripListing {
            trip,
            driver,
            vehicle,
        })
    }

    async fn driver_trip(&self, trip: Trip) -> Result<DriverTrip, Error> {
        let vehicle = self
            .store
            .find_vehicle(trip.vehicle_id)
            .await?
            .as_ref()
            .map(VehicleSummary::from);
        let bookings = self.store.list_trip_bookings(trip.id).await?;

        Ok(DriverTrip {
            trip,
            vehicle,
            bookings,
        })
    }

    /// Re-reads the trip, applies `change` and writes it back guarded by the
    /// revision that was read. A stale write is retried from a fresh read.
    async fn revise_trip<F>(
        &self,
        user: &User,
        id: Uuid,
        action: &str,
        change: F,
    ) -> Result<Trip, Error>
    where
        F: Fn(&mut Trip) -> Result<(), Error> + Send + Sync,
    {
        for attempt in 1..=MAX_EDIT_ATTEMPTS {
            let mut trip = self.find_active_trip(id).await?;

            self.authorize(user.clone(), action, trip.clone())?;

            change(&mut trip)?;

            if let Some(trip) = self.store.update_trip(&trip).await? {
                return Ok(trip);
            }

            tracing::warn!(attempt, "trip changed concurrently, retrying");
        }

        Err(Error::invalid_invocation_error(
            "trip is being modified concurrently, try again",
        ))
    }
}

#[async_trait]
impl TripAPI for Engine {
    #[tracing::instrument(skip(self, details), fields(user_id = %user.id))]
    async fn create_trip(&self, user: User, details: TripDetails) -> Result<Trip, Error> {
        let vehicle = match self.store.find_driver_vehicle(user.id).await? {
            Some(vehicle) if vehicle.active => vehicle,
            _ => {
                return Err(Error::unauthorized_error(
                    "a registered vehicle is required",
                ))
            }
        };

        let trip = Trip::new(user.id, &vehicle, details, self.today())?;

        self.store.insert_trip(&trip).await?;

        tracing::info!(trip_id = %trip.id, seats = trip.total_seats, "trip published");

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn list_trips(&self, filter: TripFilter) -> Result<Vec<TripListing>, Error> {
        let trips = self.store.list_trips(&filter).await?;

        try_join_all(trips.into_iter().map(|trip| self.trip_listing(trip))).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_trip(&self, id: Uuid) -> Result<TripListing, Error> {
        let trip = self.find_active_trip(id).await?;

        self.trip_listing(trip).await
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn list_my_trips(&self, user: User) -> Result<Vec<DriverTrip>, Error> {
        let trips = self.store.list_driver_trips(user.id).await?;

        try_join_all(trips.into_iter().map(|trip| self.driver_trip(trip))).await
    }

    #[tracing::instrument(skip(self, patch), fields(user_id = %user.id))]
    async fn edit_trip(&self, user: User, id: Uuid, patch: TripPatch) -> Result<Trip, Error> {
        let trip = self.find_active_trip(id).await?;

        self.authorize(user.clone(), "edit", trip.clone())?;

        let capacity = self
            .store
            .find_vehicle(trip.vehicle_id)
            .await?
            .map(|vehicle| vehicle.seat_capacity)
            .ok_or_else(|| Error::not_found_error("vehicle not found"))?;
        let today = self.today();

        let trip = self
            .revise_trip(&user, id, "edit", |trip| {
                trip.apply_patch(&patch, capacity, today)
            })
            .await?;

        tracing::info!(revision = trip.revision, "trip edited");

        Ok(trip)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn cancel_trip(&self, user: User, id: Uuid) -> Result<TripCancellation, Error> {
        let trip = self.find_active_trip(id).await?;

        self.authorize(user, "cancel", trip)?;

        let (trip, cancelled_bookings) = self.store.cancel_trip(id).await?;

        Ok(TripCancellation {
            trip,
            cancelled_bookings,
        })
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn start_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let trip = self.revise_trip(&user, id, "start", Trip::start).await?;

        tracing::info!("trip started");

        Ok(trip)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn finish_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let trip = self.revise_trip(&user, id, "finish", Trip::finish).await?;

        tracing::info!("trip completed");

        Ok(trip)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn deactivate_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let trip = self.find_active_trip(id).await?;

        self.authorize(user, "deactivate", trip)?;

        let trip = self.store.deactivate_trip(id).await?;

        tracing::info!("trip deactivated");

        Ok(trip)
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::block_on;
    use uuid::Uuid;

    use super::super::fixtures::{request, World};
    use crate::api::{BookingAPI, TripAPI};
    use crate::auth::User;
    use crate::entities::{fixtures, BookingStatus, TripFilter, TripPatch, TripStatus};
    use crate::error::Kind;

    #[test]
    fn create_trip_requires_an_active_vehicle() {
        let world = World::new(4);
        let walker = world.passenger("walker");

        let err = block_on(world.engine.create_trip(walker, fixtures::details(2))).unwrap_err();
        assert_eq!(err.kind, Kind::Forbidden);

        let err = block_on(
            world
                .engine
                .create_trip(world.driver.clone(), fixtures::details(5)),
        )
        .unwrap_err();
        assert_eq!(err.kind, Kind::Conflict);
    }

    #[test]
    fn listings_carry_summaries_and_hide_other_states() {
        let world = World::new(4);
        let open = world.publish(2);
        let full = world.publish(1);

        let passenger = world.passenger("ana");
        block_on(world.engine.create_booking(passenger, full.id, request(1))).unwrap();

        let listings = block_on(world.engine.list_trips(TripFilter::default())).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].trip.id, open.id);
        assert_eq!(
            listings[0].driver.as_ref().map(|d| d.name.as_str()),
            Some("Laura")
        );
        assert_eq!(listings[0].vehicle.as_ref().map(|v| v.seat_capacity), Some(4));

        let filter = TripFilter {
            status: Some(TripStatus::Full),
            ..TripFilter::default()
        };
        let listings = block_on(world.engine.list_trips(filter)).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].trip.id, full.id);
    }

    #[test]
    fn edit_trip_is_owner_only_and_bumps_revision() {
        let world = World::new(4);
        let trip = world.publish(3);
        let stranger = world.passenger("mateo");

        let patch = TripPatch {
            destination: Some("Usaquén".into()),
            ..TripPatch::default()
        };

        let err = block_on(world.engine.edit_trip(stranger, trip.id, patch.clone())).unwrap_err();
        assert_eq!(err.kind, Kind::Forbidden);

        let edited = block_on(world.engine.edit_trip(world.driver.clone(), trip.id, patch)).unwrap();
        assert_eq!(edited.destination, "Usaquén");
        assert_eq!(edited.revision, trip.revision + 1);
    }

    #[test]
    fn start_and_finish_walk_the_trip_forward() {
        let world = World::new(4);
        let trip = world.publish(3);
        let driver = world.driver.clone();

        let err = block_on(world.engine.finish_trip(driver.clone(), trip.id)).unwrap_err();
        assert!(err.is_conflict_error());

        let started = block_on(world.engine.start_trip(driver.clone(), trip.id)).unwrap();
        assert_eq!(started.status, TripStatus::InProgress);
        assert_eq!(started.available_seats, 3);

        let patch = TripPatch {
            fare_per_seat: Some(1.0),
            ..TripPatch::default()
        };
        let err = block_on(world.engine.edit_trip(driver.clone(), trip.id, patch)).unwrap_err();
        assert!(err.is_conflict_error());

        let finished = block_on(world.engine.finish_trip(driver, trip.id)).unwrap();
        assert_eq!(finished.status, TripStatus::Completed);
    }

    #[test]
    fn cancel_trip_reports_cascaded_bookings() {
        let world = World::new(4);
        let trip = world.publish(4);

        let ana = world.passenger("ana");
        let luis = world.passenger("luis");
        let first = block_on(world.engine.create_booking(ana.clone(), trip.id, request(1))).unwrap();
        block_on(world.engine.create_booking(luis, trip.id, request(2))).unwrap();

        let cancellation = block_on(world.engine.cancel_trip(world.driver.clone(), trip.id)).unwrap();
        assert_eq!(cancellation.cancelled_bookings, 2);
        assert_eq!(cancellation.trip.status, TripStatus::Cancelled);

        let booking = block_on(world.engine.find_booking(ana, first.id)).unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);

        let err = block_on(world.engine.cancel_trip(world.driver.clone(), trip.id)).unwrap_err();
        assert!(err.is_conflict_error());
    }

    #[test]
    fn deactivated_trip_disappears() {
        let world = World::new(4);
        let trip = world.publish(2);
        let driver = world.driver.clone();

        let ana = world.passenger("ana");
        let booking = block_on(world.engine.create_booking(ana.clone(), trip.id, request(1))).unwrap();

        let err = block_on(world.engine.deactivate_trip(driver.clone(), trip.id)).unwrap_err();
        assert!(err.is_conflict_error());

        block_on(world.engine.cancel_booking(ana, booking.id)).unwrap();
        let trip = block_on(world.engine.deactivate_trip(driver.clone(), trip.id)).unwrap();
        assert!(!trip.active);

        let err = block_on(world.engine.find_trip(trip.id)).unwrap_err();
        assert!(err.is_not_found_error());
        assert!(block_on(world.engine.list_my_trips(driver)).unwrap().is_empty());
    }

    #[test]
    fn my_trips_include_bookings() {
        let world = World::new(4);
        let trip = world.publish(3);
        let ana = world.passenger("ana");
        block_on(world.engine.create_booking(ana, trip.id, request(2))).unwrap();

        let other_driver = User::new(Uuid::new_v4(), "nobody");
        assert!(block_on(world.engine.list_my_trips(other_driver)).unwrap().is_empty());

        let mine = block_on(world.engine.list_my_trips(world.driver.clone())).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].bookings.len(), 1);
        assert_eq!(mine[0].trip.available_seats, 1);
    }
}
