use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Capability;
use crate::entities::{Booking, Vehicle};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub route: Option<String>,
    pub departure_date: NaiveDate,
    pub departure_time: String,
    pub total_seats: i32,
    pub available_seats: i32,
    pub fare_per_seat: f64,
    pub status: Status,
    pub active: bool,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Open,
    Full,
    InProgress,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Full => "full",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "full" => Ok(Self::Full),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::invalid_input_error(format!(
                "unknown trip status: {}",
                other
            ))),
        }
    }
}

/// Fields supplied by a driver when publishing a trip.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TripDetails {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub route: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub departure_time: Option<String>,
    pub total_seats: Option<i32>,
    pub fare_per_seat: Option<f64>,
}

/// Partial update of a trip. `available_seats` resizes the free pool while
/// keeping already booked seats.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TripPatch {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub route: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub departure_time: Option<String>,
    pub fare_per_seat: Option<f64>,
    pub available_seats: Option<i32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TripFilter {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub min_seats: Option<i32>,
    pub status: Option<Status>,
}

impl TripFilter {
    pub fn status_or_default(&self) -> Status {
        self.status.unwrap_or(Status::Open)
    }

    pub fn matches(&self, trip: &Trip) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            match needle {
                Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
                None => true,
            }
        }

        trip.active
            && trip.status == self.status_or_default()
            && contains(&trip.origin, &self.origin)
            && contains(&trip.destination, &self.destination)
            && self
                .departure_date
                .map_or(true, |date| trip.departure_date == date)
            && self
                .min_seats
                .map_or(true, |seats| trip.available_seats >= seats)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub id: Uuid,
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub seat_capacity: i32,
}

impl From<&Vehicle> for VehicleSummary {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: vehicle.id,
            plate: vehicle.plate.clone(),
            brand: vehicle.brand.clone(),
            model: vehicle.model.clone(),
            seat_capacity: vehicle.seat_capacity,
        }
    }
}

/// A trip as shown in public listings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripListing {
    #[serde(flatten)]
    pub trip: Trip,
    pub driver: Option<DriverSummary>,
    pub vehicle: Option<VehicleSummary>,
}

/// A trip as seen by its own driver, with the bookings made against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverTrip {
    #[serde(flatten)]
    pub trip: Trip,
    pub vehicle: Option<VehicleSummary>,
    pub bookings: Vec<Booking>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripCancellation {
    pub trip: Trip,
    pub cancelled_bookings: u64,
}

fn required_text(value: &Option<String>, field: &str) -> Result<String, Error> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(Error::invalid_input_error(format!("{} is required", field))),
    }
}

fn validate_fare(fare: f64) -> Result<f64, Error> {
    if !fare.is_finite() || fare < 0.0 {
        return Err(Error::invalid_input_error(
            "fare per seat must be a nonnegative amount",
        ));
    }

    Ok(fare)
}

fn validate_departure_date(date: NaiveDate, today: NaiveDate) -> Result<NaiveDate, Error> {
    if date < today {
        return Err(Error::invalid_input_error(
            "departure date cannot be in the past",
        ));
    }

    Ok(date)
}

impl Trip {
    pub fn new(
        driver_id: Uuid,
        vehicle: &Vehicle,
        details: TripDetails,
        today: NaiveDate,
    ) -> Result<Self, Error> {
        let origin = required_text(&details.origin, "origin")?;
        let destination = required_text(&details.destination, "destination")?;
        let departure_time = required_text(&details.departure_time, "departure time")?;
        let fare_per_seat = details
            .fare_per_seat
            .ok_or_else(|| Error::invalid_input_error("fare per seat is required"))
            .and_then(validate_fare)?;
        let departure_date =
            validate_departure_date(details.departure_date.unwrap_or(today), today)?;

        let total_seats = details.total_seats.unwrap_or(vehicle.seat_capacity);
        if total_seats < 1 {
            return Err(Error::invalid_input_error(
                "a trip must offer at least one seat",
            ));
        }
        if total_seats > vehicle.seat_capacity {
            return Err(Error::invalid_invocation_error(format!(
                "seats cannot exceed the vehicle capacity ({})",
                vehicle.seat_capacity
            )));
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            driver_id,
            vehicle_id: vehicle.id,
            origin,
            destination,
            route: details
                .route
                .map(|route| route.trim().to_string())
                .filter(|route| !route.is_empty()),
            departure_date,
            departure_time,
            total_seats,
            available_seats: total_seats,
            fare_per_seat,
            status: Status::Open,
            active: true,
            revision: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn capability(&self, user_id: Uuid) -> Capability {
        if self.driver_id == user_id {
            Capability::Driver
        } else {
            Capability::Unrelated
        }
    }

    pub fn booked_seats(&self) -> i32 {
        self.total_seats - self.available_seats
    }

    pub fn ensure_open(&self) -> Result<(), Error> {
        match self.status {
            Status::Open if self.active => Ok(()),
            _ => Err(Error::invalid_invocation_error(
                "trip is not open for booking",
            )),
        }
    }

    pub fn ensure_seats(&self, seats: i32) -> Result<(), Error> {
        if self.available_seats < seats {
            return Err(Error::invalid_invocation_error(format!(
                "only {} seats available",
                self.available_seats
            )));
        }

        Ok(())
    }

    fn sync_full_status(&mut self) {
        match self.status {
            Status::Open if self.available_seats == 0 => self.status = Status::Full,
            Status::Full if self.available_seats > 0 => self.status = Status::Open,
            _ => (),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn reserve(&mut self, seats: i32) -> Result<(), Error> {
        self.ensure_open()?;
        self.ensure_seats(seats)?;

        self.available_seats -= seats;
        self.sync_full_status();
        self.touch();

        Ok(())
    }

    /// Returns seats held by a cancelled booking. Trips that are already
    /// finished or cancelled keep their counters.
    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn release(&mut self, seats: i32) -> bool {
        match self.status {
            Status::Open | Status::Full | Status::InProgress
                if self.available_seats + seats <= self.total_seats =>
            {
                self.available_seats += seats;
                self.sync_full_status();
                self.touch();
                true
            }
            _ => false,
        }
    }

    #[tracing::instrument(skip(self, patch), fields(trip_id = %self.id))]
    pub fn apply_patch(
        &mut self,
        patch: &TripPatch,
        vehicle_capacity: i32,
        today: NaiveDate,
    ) -> Result<(), Error> {
        match self.status {
            Status::InProgress | Status::Completed | Status::Cancelled => {
                return Err(Error::invalid_invocation_error(format!(
                    "a trip that is {} cannot be modified",
                    self.status.name()
                )));
            }
            _ => (),
        }

        if patch.origin.is_some() {
            self.origin = required_text(&patch.origin, "origin")?;
        }
        if patch.destination.is_some() {
            self.destination = required_text(&patch.destination, "destination")?;
        }
        if patch.departure_time.is_some() {
            self.departure_time = required_text(&patch.departure_time, "departure time")?;
        }
        if let Some(route) = &patch.route {
            let route = route.trim();
            self.route = (!route.is_empty()).then(|| route.to_string());
        }
        if let Some(date) = patch.departure_date {
            self.departure_date = validate_departure_date(date, today)?;
        }
        if let Some(fare) = patch.fare_per_seat {
            self.fare_per_seat = validate_fare(fare)?;
        }

        if let Some(available_seats) = patch.available_seats {
            if available_seats < 0 {
                return Err(Error::invalid_input_error(
                    "available seats cannot be negative",
                ));
            }

            let over_capacity = || {
                Error::invalid_invocation_error(format!(
                    "total seats cannot exceed the vehicle capacity ({})",
                    vehicle_capacity
                ))
            };

            let total_seats = available_seats
                .checked_add(self.booked_seats())
                .ok_or_else(over_capacity)?;
            if total_seats < 1 {
                return Err(Error::invalid_input_error(
                    "a trip must offer at least one seat",
                ));
            }
            if total_seats > vehicle_capacity {
                return Err(over_capacity());
            }

            self.total_seats = total_seats;
            self.available_seats = available_seats;
            self.sync_full_status();
        }

        self.touch();

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn start(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Open | Status::Full => {
                self.status = Status::InProgress;
                self.touch();
                Ok(())
            }
            _ => Err(Error::invalid_invocation_error(
                "only an open or full trip can be started",
            )),
        }
    }

    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn finish(&mut self) -> Result<(), Error> {
        match self.status {
            Status::InProgress => {
                self.status = Status::Completed;
                self.touch();
                Ok(())
            }
            _ => Err(Error::invalid_invocation_error(
                "only a trip in progress can be completed",
            )),
        }
    }

    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn cancel(&mut self) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(Error::invalid_invocation_error(
                "trip is already cancelled or completed",
            ));
        }

        self.status = Status::Cancelled;
        self.touch();

        Ok(())
    }

    /// Soft-deletes the trip. `held_bookings` is the number of pending or
    /// confirmed bookings still referencing it.
    #[tracing::instrument(skip(self), fields(trip_id = %self.id))]
    pub fn deactivate(&mut self, held_bookings: i64) -> Result<(), Error> {
        if !self.active {
            return Err(Error::not_found_error("trip not found"));
        }
        if held_bookings > 0 {
            return Err(Error::invalid_invocation_error(
                "trip has active bookings, cancel them first",
            ));
        }

        self.active = false;
        self.status = Status::Cancelled;
        self.touch();

        Ok(())
    }
}

impl PolarClass for Trip {
    fn get_polar_class_builder() -> oso::ClassBuilder<Trip> {
        oso::Class::builder()
            .name("Trip")
            .add_attribute_getter("id", |recv: &Trip| recv.id)
            .add_attribute_getter("status", |recv: &Trip| recv.status.name().to_string())
            .add_method("capability", |recv: &Trip, user_id: Uuid| {
                recv.capability(user_id).name().to_string()
            })
    }

    fn get_polar_class() -> oso::Class {
        let builder = Trip::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, NaiveDate, Utc};
    use uuid::Uuid;

    use super::{Trip, TripDetails};
    use crate::entities::Vehicle;

    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn vehicle(driver_id: Uuid, seat_capacity: i32) -> Vehicle {
        Vehicle {
            id: Uuid::new_v4(),
            driver_id,
            plate: "ABC123".into(),
            brand: "Renault".into(),
            model: "Logan".into(),
            seat_capacity,
            active: true,
        }
    }

    pub fn details(total_seats: i32) -> TripDetails {
        TripDetails {
            origin: Some("Campus Norte".into()),
            destination: Some("Chapinero".into()),
            route: Some("Autopista Norte".into()),
            departure_date: Some(today() + Duration::days(3)),
            departure_time: Some("07:30".into()),
            total_seats: Some(total_seats),
            fare_per_seat: Some(5000.0),
        }
    }

    pub fn trip(total_seats: i32) -> Trip {
        let driver_id = Uuid::new_v4();
        Trip::new(driver_id, &vehicle(driver_id, 4), details(total_seats), today()).unwrap()
    }
}

#[test]
fn new_trip_starts_open_with_all_seats() {
    let trip = fixtures::trip(3);

    assert_eq!(trip.status, Status::Open);
    assert_eq!(trip.total_seats, 3);
    assert_eq!(trip.available_seats, 3);
    assert!(trip.active);
}

#[test]
fn new_trip_defaults_seats_to_vehicle_capacity() {
    let driver_id = Uuid::new_v4();
    let vehicle = fixtures::vehicle(driver_id, 4);
    let mut details = fixtures::details(1);
    details.total_seats = None;

    let trip = Trip::new(driver_id, &vehicle, details, fixtures::today()).unwrap();
    assert_eq!(trip.total_seats, 4);
}

#[test]
fn new_trip_defaults_date_to_today() {
    let driver_id = Uuid::new_v4();
    let vehicle = fixtures::vehicle(driver_id, 4);
    let mut details = fixtures::details(2);
    details.departure_date = None;

    let trip = Trip::new(driver_id, &vehicle, details, fixtures::today()).unwrap();
    assert_eq!(trip.departure_date, fixtures::today());
}

#[test]
fn new_trip_rejects_bad_details() {
    use crate::error::Kind;
    use chrono::Duration;

    let driver_id = Uuid::new_v4();
    let vehicle = fixtures::vehicle(driver_id, 4);
    let today = fixtures::today();

    let mut details = fixtures::details(5);
    let err = Trip::new(driver_id, &vehicle, details.clone(), today).unwrap_err();
    assert_eq!(err.kind, Kind::Conflict);

    details = fixtures::details(2);
    details.origin = Some("   ".into());
    let err = Trip::new(driver_id, &vehicle, details, today).unwrap_err();
    assert_eq!(err.kind, Kind::Validation);

    details = fixtures::details(2);
    details.fare_per_seat = None;
    let err = Trip::new(driver_id, &vehicle, details, today).unwrap_err();
    assert_eq!(err.kind, Kind::Validation);

    details = fixtures::details(2);
    details.fare_per_seat = Some(-1.0);
    let err = Trip::new(driver_id, &vehicle, details, today).unwrap_err();
    assert_eq!(err.kind, Kind::Validation);

    details = fixtures::details(2);
    details.departure_date = Some(today - Duration::days(1));
    let err = Trip::new(driver_id, &vehicle, details, today).unwrap_err();
    assert_eq!(err.kind, Kind::Validation);

    details = fixtures::details(0);
    let err = Trip::new(driver_id, &vehicle, details, today).unwrap_err();
    assert_eq!(err.kind, Kind::Validation);
}

#[test]
fn reserve_marks_trip_full_and_release_reopens_it() {
    let mut trip = fixtures::trip(3);

    trip.reserve(2).unwrap();
    assert_eq!(trip.available_seats, 1);
    assert_eq!(trip.status, Status::Open);

    assert!(trip.reserve(2).unwrap_err().is_conflict_error());
    assert_eq!(trip.available_seats, 1);

    trip.reserve(1).unwrap();
    assert_eq!(trip.available_seats, 0);
    assert_eq!(trip.status, Status::Full);

    assert!(trip.reserve(1).unwrap_err().is_conflict_error());

    assert!(trip.release(2));
    assert_eq!(trip.available_seats, 2);
    assert_eq!(trip.status, Status::Open);
}

#[test]
fn release_never_exceeds_total_or_touches_finished_trips() {
    let mut trip = fixtures::trip(2);

    assert!(!trip.release(1));
    assert_eq!(trip.available_seats, 2);

    trip.reserve(1).unwrap();
    trip.cancel().unwrap();
    assert!(!trip.release(1));
    assert_eq!(trip.available_seats, 1);
}

#[test]
fn patching_available_seats_keeps_booked_seats() {
    let mut trip = fixtures::trip(3);
    trip.reserve(2).unwrap();

    let patch = TripPatch {
        available_seats: Some(2),
        ..TripPatch::default()
    };
    trip.apply_patch(&patch, 4, fixtures::today()).unwrap();
    assert_eq!(trip.total_seats, 4);
    assert_eq!(trip.available_seats, 2);
    assert_eq!(trip.booked_seats(), 2);

    let patch = TripPatch {
        available_seats: Some(3),
        ..TripPatch::default()
    };
    let err = trip.apply_patch(&patch, 4, fixtures::today()).unwrap_err();
    assert!(err.is_conflict_error());
    assert_eq!(trip.total_seats, 4);

    let patch = TripPatch {
        available_seats: Some(0),
        ..TripPatch::default()
    };
    trip.apply_patch(&patch, 4, fixtures::today()).unwrap();
    assert_eq!(trip.status, Status::Full);
    assert_eq!(trip.total_seats, 2);
}

#[test]
fn patch_with_huge_seat_count_is_over_capacity() {
    let mut trip = fixtures::trip(3);
    trip.reserve(1).unwrap();

    let patch = TripPatch {
        available_seats: Some(i32::MAX),
        ..TripPatch::default()
    };
    let err = trip.apply_patch(&patch, 4, fixtures::today()).unwrap_err();
    assert!(err.is_conflict_error());
    assert_eq!(trip.total_seats, 3);
    assert_eq!(trip.available_seats, 2);
}

#[test]
fn patch_is_rejected_once_trip_has_started() {
    let mut trip = fixtures::trip(3);
    trip.start().unwrap();

    let patch = TripPatch {
        origin: Some("Usaquén".into()),
        ..TripPatch::default()
    };
    let err = trip.apply_patch(&patch, 4, fixtures::today()).unwrap_err();
    assert!(err.is_conflict_error());
    assert_eq!(trip.origin, "Campus Norte");
}

#[test]
fn cancel_is_rejected_for_terminal_trips() {
    let mut trip = fixtures::trip(3);
    trip.cancel().unwrap();
    assert!(trip.cancel().unwrap_err().is_conflict_error());

    let mut trip = fixtures::trip(3);
    trip.start().unwrap();
    trip.finish().unwrap();
    assert_eq!(trip.status, Status::Completed);
    assert!(trip.cancel().unwrap_err().is_conflict_error());
}

#[test]
fn deactivate_requires_no_held_bookings() {
    let mut trip = fixtures::trip(3);

    assert!(trip.deactivate(1).unwrap_err().is_conflict_error());
    assert!(trip.active);

    trip.deactivate(0).unwrap();
    assert!(!trip.active);
    assert_eq!(trip.status, Status::Cancelled);
}

#[test]
fn filter_matches_substrings_case_insensitively() {
    let trip = fixtures::trip(3);

    let filter = TripFilter {
        origin: Some("campus".into()),
        destination: Some("PINE".into()),
        min_seats: Some(3),
        ..TripFilter::default()
    };
    assert!(filter.matches(&trip));

    let filter = TripFilter {
        min_seats: Some(4),
        ..TripFilter::default()
    };
    assert!(!filter.matches(&trip));

    let filter = TripFilter {
        status: Some(Status::Full),
        ..TripFilter::default()
    };
    assert!(!filter.matches(&trip));
}

#[test]
fn filter_never_matches_inactive_trips() {
    let mut trip = fixtures::trip(3);
    trip.active = false;

    assert!(!TripFilter::default().matches(&trip));
}
