mod common;

use proptest::prelude::*;
use tokio_test::block_on;
use uuid::Uuid;

use carpool::api::{BookingAPI, TripAPI};
use carpool::auth::User;
use carpool::entities::{BookingStatus, TripPatch, TripStatus};

use common::{backends, counts_seats, request, Backend, World};

#[derive(Clone, Debug)]
enum Op {
    Book { passenger: usize, seats: i32 },
    Cancel(usize),
    Confirm(usize),
    Complete(usize),
    Deactivate(usize),
    Resize(i32),
    Start,
    Finish,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..5usize, 1..4i32).prop_map(|(passenger, seats)| Op::Book { passenger, seats }),
        3 => (0..32usize).prop_map(Op::Cancel),
        2 => (0..32usize).prop_map(Op::Confirm),
        2 => (0..32usize).prop_map(Op::Complete),
        1 => (0..32usize).prop_map(Op::Deactivate),
        2 => (0..4i32).prop_map(Op::Resize),
        1 => Just(Op::Start),
        1 => Just(Op::Finish),
    ]
}

fn pick(placed: &[(Uuid, User)], n: usize) -> Option<(Uuid, User)> {
    placed.get(n % placed.len().max(1)).cloned()
}

async fn apply(
    world: &World,
    passengers: &[User],
    placed: &mut Vec<(Uuid, User)>,
    trip_id: Uuid,
    op: Op,
) {
    let engine = &world.engine;
    let driver = world.driver.clone();

    // rejected operations are expected; only their effect on state matters
    match op {
        Op::Book { passenger, seats } => {
            let user = passengers[passenger].clone();
            let booked = engine
                .create_booking(user.clone(), trip_id, request(seats))
                .await;
            if let Ok(booking) = booked {
                placed.push((booking.id, user));
            }
        }
        Op::Cancel(n) => {
            if let Some((id, user)) = pick(placed, n) {
                let _ = engine.cancel_booking(user, id).await;
            }
        }
        Op::Confirm(n) => {
            if let Some((id, _)) = pick(placed, n) {
                let _ = engine.confirm_booking(driver, id).await;
            }
        }
        Op::Complete(n) => {
            if let Some((id, _)) = pick(placed, n) {
                let _ = engine.complete_booking(driver, id).await;
            }
        }
        Op::Deactivate(n) => {
            if let Some((id, user)) = pick(placed, n) {
                let _ = engine.deactivate_booking(user, id).await;
            }
        }
        Op::Resize(available_seats) => {
            let patch = TripPatch {
                available_seats: Some(available_seats),
                ..TripPatch::default()
            };
            let _ = engine.edit_trip(driver, trip_id, patch).await;
        }
        Op::Start => {
            let _ = engine.start_trip(driver, trip_id).await;
        }
        Op::Finish => {
            let _ = engine.finish_trip(driver, trip_id).await;
        }
    }
}

async fn check_invariants(backend: &Backend, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let world = World::on(backend, 4).await;
    let trip_id = world.publish(3).await.id;

    let mut passengers = Vec::new();
    for n in 0..5 {
        passengers.push(world.passenger(&format!("p{}", n)).await);
    }
    let mut placed: Vec<(Uuid, User)> = Vec::new();

    for op in ops {
        apply(&world, &passengers, &mut placed, trip_id, op).await;

        let trip = world.trip(trip_id).await;
        prop_assert!(trip.available_seats >= 0);
        prop_assert!(trip.available_seats <= trip.total_seats);

        let ids: Vec<Uuid> = placed.iter().map(|(id, _)| *id).collect();
        let bookings = world.bookings(&ids).await;

        if counts_seats(trip.status) {
            let occupied: i32 = bookings
                .iter()
                .filter(|booking| booking.status != BookingStatus::Cancelled)
                .map(|booking| booking.seats)
                .sum();
            prop_assert_eq!(trip.available_seats + occupied, trip.total_seats);
        }

        if matches!(trip.status, TripStatus::Open | TripStatus::Full) {
            prop_assert_eq!(trip.status == TripStatus::Full, trip.available_seats == 0);
        }

        for passenger in &passengers {
            let held = bookings
                .iter()
                .filter(|booking| booking.passenger_id == passenger.id && booking.status.is_held())
                .count();
            prop_assert!(held <= 1);
        }
    }

    Ok(())
}

async fn check_trip_cancellation(
    backend: &Backend,
    seats: Vec<i32>,
    confirm_first: bool,
) -> Result<(), TestCaseError> {
    let world = World::on(backend, 4).await;
    let trip = world.publish(4).await;
    let driver = world.driver.clone();

    let mut ids = Vec::new();
    for (n, seats) in seats.into_iter().enumerate() {
        let passenger = world.passenger(&format!("p{}", n)).await;
        if let Ok(booking) = world.engine.create_booking(passenger, trip.id, request(seats)).await {
            ids.push(booking.id);
        }
    }
    if confirm_first {
        if let Some(id) = ids.first() {
            world.engine.confirm_booking(driver.clone(), *id).await.unwrap();
        }
    }

    let cancellation = world.engine.cancel_trip(driver, trip.id).await.unwrap();
    prop_assert_eq!(cancellation.cancelled_bookings as usize, ids.len());

    for booking in world.bookings(&ids).await {
        prop_assert_eq!(booking.status, BookingStatus::Cancelled);
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    #[test]
    fn seat_counters_and_uniqueness_hold_after_every_operation(
        ops in proptest::collection::vec(op_strategy(), 1..40)
    ) {
        for backend in backends() {
            block_on(check_invariants(&backend, ops.clone()))?;
        }
    }

    #[test]
    fn cancelling_the_trip_releases_every_hold(
        seats in proptest::collection::vec(1..3i32, 1..5),
        confirm_first in any::<bool>()
    ) {
        for backend in backends() {
            block_on(check_trip_cancellation(&backend, seats.clone(), confirm_first))?;
        }
    }
}
