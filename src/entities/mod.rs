mod booking;
mod trip;
mod vehicle;

pub use booking::{
    Booking, BookingRequest, PassengerBooking, PassengerSummary, Status as BookingStatus,
    Transition, TripBooking, TripBookings, TripSeats,
};
pub use trip::{
    DriverSummary, DriverTrip, Status as TripStatus, Trip, TripCancellation, TripDetails,
    TripFilter, TripListing, TripPatch, VehicleSummary,
};
pub use vehicle::Vehicle;

#[cfg(test)]
pub(crate) use trip::fixtures;
