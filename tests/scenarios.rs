mod common;

use carpool::api::{BookingAPI, TripAPI};
use carpool::entities::{BookingStatus, TripStatus};
use carpool::error::Kind;

use common::{backends, request, World};

#[tokio::test]
async fn seat_inventory_through_a_trip_lifecycle() {
    for backend in backends() {
        let world = World::on(&backend, 4).await;
        let trip = world.publish(4).await;
        let driver = world.driver.clone();

        let ana = world.passenger("ana").await;
        let beto = world.passenger("beto").await;
        let carla = world.passenger("carla").await;

        // three of four seats go to ana
        let ana_booking = world
            .engine
            .create_booking(ana.clone(), trip.id, request(3))
            .await
            .unwrap();
        let current = world.trip(trip.id).await;
        assert_eq!(current.available_seats, 1);
        assert_eq!(current.status, TripStatus::Open);

        // beto cannot take two
        let err = world
            .engine
            .create_booking(beto.clone(), trip.id, request(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind, Kind::Conflict);
        assert_eq!(world.trip(trip.id).await.available_seats, 1);

        // the last seat fills the trip
        let beto_booking = world
            .engine
            .create_booking(beto.clone(), trip.id, request(1))
            .await
            .unwrap();
        let current = world.trip(trip.id).await;
        assert_eq!(current.available_seats, 0);
        assert_eq!(current.status, TripStatus::Full);

        // ana cancelling reopens it
        world
            .engine
            .cancel_booking(ana.clone(), ana_booking.id)
            .await
            .unwrap();
        let current = world.trip(trip.id).await;
        assert_eq!(current.available_seats, 3);
        assert_eq!(current.status, TripStatus::Open);

        // driver confirms and completes beto
        let confirmed = world
            .engine
            .confirm_booking(driver.clone(), beto_booking.id)
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        let completed = world
            .engine
            .complete_booking(driver.clone(), beto_booking.id)
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        let err = world
            .engine
            .confirm_booking(driver.clone(), beto_booking.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, Kind::Conflict);

        // cancelling the trip sweeps the pending booking only
        let carla_booking = world
            .engine
            .create_booking(carla.clone(), trip.id, request(1))
            .await
            .unwrap();
        let cancellation = world
            .engine
            .cancel_trip(driver.clone(), trip.id)
            .await
            .unwrap();
        assert_eq!(cancellation.cancelled_bookings, 1);
        assert_eq!(cancellation.trip.status, TripStatus::Cancelled);

        let bookings = world
            .bookings(&[ana_booking.id, beto_booking.id, carla_booking.id])
            .await;
        assert_eq!(bookings[0].status, BookingStatus::Cancelled);
        assert_eq!(bookings[1].status, BookingStatus::Completed);
        assert_eq!(bookings[2].status, BookingStatus::Cancelled);
    }
}

#[tokio::test]
async fn drivers_cannot_book_their_own_trip() {
    for backend in backends() {
        let world = World::on(&backend, 4).await;
        let trip = world.publish(2).await;

        let err = world
            .engine
            .create_booking(world.driver.clone(), trip.id, request(1))
            .await
            .unwrap_err();

        assert_eq!(err.kind, Kind::Forbidden);
        assert_eq!(world.trip(trip.id).await.available_seats, 2);
    }
}

#[tokio::test]
async fn cancelling_a_booking_twice_is_rejected() {
    for backend in backends() {
        let world = World::on(&backend, 4).await;
        let trip = world.publish(3).await;
        let ana = world.passenger("ana").await;

        let booking = world
            .engine
            .create_booking(ana.clone(), trip.id, request(2))
            .await
            .unwrap();

        world
            .engine
            .cancel_booking(ana.clone(), booking.id)
            .await
            .unwrap();
        let err = world
            .engine
            .cancel_booking(ana, booking.id)
            .await
            .unwrap_err();

        assert_eq!(err.kind, Kind::Conflict);
        assert_eq!(world.trip(trip.id).await.available_seats, 3);
    }
}

#[tokio::test]
async fn trip_cancellation_leaves_no_held_bookings() {
    for backend in backends() {
        let world = World::on(&backend, 4).await;
        let trip = world.publish(4).await;
        let driver = world.driver.clone();

        let mut ids = Vec::new();
        for name in ["ana", "beto", "carla"] {
            let passenger = world.passenger(name).await;
            let booking = world
                .engine
                .create_booking(passenger, trip.id, request(1))
                .await
                .unwrap();
            ids.push(booking.id);
        }
        world
            .engine
            .confirm_booking(driver.clone(), ids[0])
            .await
            .unwrap();

        world.engine.cancel_trip(driver, trip.id).await.unwrap();

        for booking in world.bookings(&ids).await {
            assert_eq!(booking.status, BookingStatus::Cancelled);
        }
    }
}

#[tokio::test]
async fn resizing_a_trip_keeps_booked_seats() {
    use carpool::entities::TripPatch;

    for backend in backends() {
        let world = World::on(&backend, 4).await;
        let trip = world.publish(2).await;
        let driver = world.driver.clone();
        let ana = world.passenger("ana").await;

        world
            .engine
            .create_booking(ana, trip.id, request(2))
            .await
            .unwrap();
        assert_eq!(world.trip(trip.id).await.status, TripStatus::Full);

        let patch = TripPatch {
            available_seats: Some(2),
            ..TripPatch::default()
        };
        let edited = world
            .engine
            .edit_trip(driver.clone(), trip.id, patch)
            .await
            .unwrap();
        assert_eq!(edited.total_seats, 4);
        assert_eq!(edited.available_seats, 2);
        assert_eq!(edited.status, TripStatus::Open);
        assert_eq!(world.occupied_seats(trip.id).await, 2);

        let patch = TripPatch {
            available_seats: Some(3),
            ..TripPatch::default()
        };
        let err = world
            .engine
            .edit_trip(driver, trip.id, patch)
            .await
            .unwrap_err();
        assert_eq!(err.kind, Kind::Conflict);
    }
}

#[tokio::test]
async fn inactive_trips_never_show_up_in_listings() {
    use carpool::entities::TripFilter;

    for backend in backends() {
        let world = World::on(&backend, 4).await;
        let kept = world.publish(2).await;
        let dropped = world.publish(2).await;

        world
            .engine
            .deactivate_trip(world.driver.clone(), dropped.id)
            .await
            .unwrap();

        for status in [None, Some(TripStatus::Open), Some(TripStatus::Cancelled)] {
            let filter = TripFilter {
                status,
                ..TripFilter::default()
            };
            let listings = world.engine.list_trips(filter).await.unwrap();
            assert!(listings.iter().all(|listing| listing.trip.id != dropped.id));
        }

        // a shared database also lists other drivers' trips
        let listings: Vec<_> = world
            .engine
            .list_trips(TripFilter::default())
            .await
            .unwrap()
            .into_iter()
            .filter(|listing| listing.trip.driver_id == world.driver.id)
            .collect();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].trip.id, kept.id);
    }
}
