mod extract;
mod handlers;

use std::net::SocketAddr;

use axum::{
    extract::Extension,
    routing::{get, patch},
    Router,
};

use crate::api::DynAPI;
use crate::error::Error;
use crate::server::handlers::{bookings, trips};

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/trips", get(trips::list).post(trips::create))
        .route(
            "/trips/:id",
            get(trips::find).patch(trips::edit).delete(trips::deactivate),
        )
        .route("/trips/:id/cancel", patch(trips::cancel))
        .route("/trips/:id/start", patch(trips::start))
        .route("/trips/:id/finish", patch(trips::finish))
        .route(
            "/trips/:id/bookings",
            get(trips::bookings).post(trips::book),
        )
        .route("/drivers/me/trips", get(trips::mine))
        .route("/passengers/me/bookings", get(bookings::mine))
        .route(
            "/bookings/:id",
            get(bookings::find).delete(bookings::deactivate),
        )
        .route("/bookings/:id/cancel", patch(bookings::cancel))
        .route("/bookings/:id/confirm", patch(bookings::confirm))
        .route("/bookings/:id/complete", patch(bookings::complete))
        .layer(Extension(api))
}

pub async fn serve(api: DynAPI, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(Error::unexpected_error)
}
