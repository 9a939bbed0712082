use super::Engine;

use async_trait::async_trait;
use futures::future::try_join_all;
use uuid::Uuid;

use crate::{
    api::BookingAPI,
    auth::User,
    entities::{
        Booking, BookingRequest, PassengerBooking, PassengerSummary, Transition, TripBooking,
        TripBookings, TripSeats,
    },
    error::{Error, Kind},
};

impl Engine {
    async fn find_active_booking(&self, id: Uuid) -> Result<Booking, Error> {
        match self.store.find_booking(id).await? {
            Some(booking) if booking.active => Ok(booking),
            _ => Err(Error::not_found_error("booking not found")),
        }
    }

    async fn passenger_booking(&self, booking: Booking) -> Result<PassengerBooking, Error> {
        let trip = match self.store.find_trip(booking.trip_id).await? {
            Some(trip) => Some(self.trip_listing(trip).await?),
            None => None,
        };

        Ok(PassengerBooking { booking, trip })
    }

    async fn trip_booking(&self, booking: Booking) -> Result<TripBooking, Error> {
        let passenger = self
            .store
            .find_user(booking.passenger_id)
            .await?
            .map(|user| PassengerSummary {
                id: user.id,
                name: user.name,
            });

        Ok(TripBooking { booking, passenger })
    }

    async fn transition_booking(
        &self,
        user: User,
        id: Uuid,
        transition: Transition,
    ) -> Result<Booking, Error> {
        let booking = self.find_active_booking(id).await?;

        self.authorize(user, transition.action(), booking)?;

        let (booking, released) = self.store.transition_booking(id, transition).await?;

        match released {
            Some(trip) => tracing::info!(
                status = booking.status.name(),
                available_seats = trip.available_seats,
                "booking transitioned, seats released"
            ),
            None => tracing::info!(status = booking.status.name(), "booking transitioned"),
        }

        Ok(booking)
    }
}

#[async_trait]
impl BookingAPI for Engine {
    #[tracing::instrument(skip(self, request), fields(user_id = %user.id, seats = request.seats))]
    async fn create_booking(
        &self,
        user: User,
        trip_id: Uuid,
        request: BookingRequest,
    ) -> Result<Booking, Error> {
        request.validate()?;

        let trip = self.find_active_trip(trip_id).await?;

        trip.ensure_open()?;

        self.authorize(user.clone(), "book", trip.clone())
            .map_err(|err| match err.kind {
                Kind::Forbidden => Error::unauthorized_error("you cannot book your own trip"),
                _ => err,
            })?;

        trip.ensure_seats(request.seats)?;

        if self
            .store
            .find_held_booking(trip.id, user.id)
            .await?
            .is_some()
        {
            return Err(Error::invalid_invocation_error(
                "you already have a booking on this trip",
            ));
        }

        let mut booking = Booking::new(&trip, user.id, &request)?;

        // the store re-checks seats and uniqueness and reprices when it writes
        let trip = self.store.place_booking(&mut booking).await?;

        tracing::info!(
            booking_id = %booking.id,
            available_seats = trip.available_seats,
            "booking placed"
        );

        Ok(booking)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn cancel_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        self.transition_booking(user, id, Transition::Cancel).await
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn confirm_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        self.transition_booking(user, id, Transition::Confirm).await
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn complete_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        self.transition_booking(user, id, Transition::Complete).await
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn deactivate_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        self.transition_booking(user, id, Transition::Deactivate).await
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn list_my_bookings(&self, user: User) -> Result<Vec<PassengerBooking>, Error> {
        let bookings = self.store.list_passenger_bookings(user.id).await?;

        try_join_all(
            bookings
                .into_iter()
                .map(|booking| self.passenger_booking(booking)),
        )
        .await
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn list_trip_bookings(&self, user: User, trip_id: Uuid) -> Result<TripBookings, Error> {
        let trip = self.find_active_trip(trip_id).await?;
        let seats = TripSeats::from(&trip);

        self.authorize(user, "list_bookings", trip)?;

        let bookings = self.store.list_trip_bookings(trip_id).await?;
        let bookings = try_join_all(
            bookings
                .into_iter()
                .map(|booking| self.trip_booking(booking)),
        )
        .await?;

        Ok(TripBookings {
            trip: seats,
            bookings,
        })
    }

    #[tracing::instrument(skip(self), fields(user_id = %user.id))]
    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        let booking = self.find_active_booking(id).await?;

        self.authorize(user, "read", booking.clone())?;

        Ok(booking)
    }
}
