use oso::{Oso, PolarClass};

use crate::auth::User;
use crate::entities::{Booking, Trip};
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(User::get_polar_class())?;
    o.register_class(Trip::get_polar_class())?;
    o.register_class(Booking::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
fn trip_and_booking() -> (User, User, Trip, Booking) {
    use crate::entities::{fixtures, BookingRequest};
    use uuid::Uuid;

    let trip = fixtures::trip(4);
    let driver = User::new(trip.driver_id, "driver");
    let passenger = User::new(Uuid::new_v4(), "passenger");

    let request = BookingRequest {
        seats: 1,
        pickup: "Portería 1".into(),
    };
    let booking = Booking::new(&trip, passenger.id, &request).unwrap();

    (driver, passenger, trip, booking)
}

#[test]
fn trip_driver_role_test() {
    let authorizor = new().unwrap();
    let (driver, passenger, trip, _) = trip_and_booking();

    let result = authorizor.query_rule("has_role", (driver.clone(), "driver", trip.clone()));
    assert!(result.unwrap().next().unwrap().is_ok());

    let result = authorizor.query_rule("has_role", (passenger.clone(), "driver", trip.clone()));
    assert!(result.unwrap().next().is_none());

    for action in ["edit", "cancel", "deactivate", "start", "finish", "list_bookings"] {
        let result = authorizor.is_allowed(driver.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), true, "driver should be allowed to {}", action);

        let result = authorizor.is_allowed(passenger.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), false, "passenger should not be allowed to {}", action);
    }
}

#[test]
fn trip_book_test() {
    let authorizor = new().unwrap();
    let (driver, passenger, trip, _) = trip_and_booking();

    let result = authorizor.is_allowed(passenger.clone(), "book", trip.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "book", trip.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn booking_passenger_role_test() {
    let authorizor = new().unwrap();
    let (_, passenger, _, booking) = trip_and_booking();

    let result = authorizor.query_rule(
        "has_role",
        (passenger.clone(), "passenger", booking.clone()),
    );
    assert!(result.unwrap().next().unwrap().is_ok());

    for action in ["read", "cancel", "deactivate"] {
        let result = authorizor.is_allowed(passenger.clone(), action, booking.clone());
        assert_eq!(result.unwrap(), true, "passenger should be allowed to {}", action);
    }

    for action in ["confirm", "complete"] {
        let result = authorizor.is_allowed(passenger.clone(), action, booking.clone());
        assert_eq!(result.unwrap(), false, "passenger should not be allowed to {}", action);
    }
}

#[test]
fn booking_driver_role_test() {
    let authorizor = new().unwrap();
    let (driver, _, _, booking) = trip_and_booking();

    let result = authorizor.query_rule("has_role", (driver.clone(), "driver", booking.clone()));
    assert!(result.unwrap().next().unwrap().is_ok());

    for action in ["read", "confirm", "complete"] {
        let result = authorizor.is_allowed(driver.clone(), action, booking.clone());
        assert_eq!(result.unwrap(), true, "driver should be allowed to {}", action);
    }

    for action in ["cancel", "deactivate"] {
        let result = authorizor.is_allowed(driver.clone(), action, booking.clone());
        assert_eq!(result.unwrap(), false, "driver should not be allowed to {}", action);
    }
}

#[test]
fn unrelated_user_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();
    let (_, _, trip, booking) = trip_and_booking();

    // a stored "admin" role grants nothing
    let mut stranger = User::new(Uuid::new_v4(), "stranger");
    stranger.role = "admin".into();

    let result = authorizor.is_allowed(stranger.clone(), "read", booking.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(stranger.clone(), "edit", trip.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(stranger.clone(), "book", trip.clone());
    assert_eq!(result.unwrap(), true);
}
