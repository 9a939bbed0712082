use super::Engine;

use async_trait::async_trait;

use crate::{api::IdentityAPI, auth::User, error::Error};

#[async_trait]
impl IdentityAPI for Engine {
    #[tracing::instrument(skip_all)]
    async fn authenticate(&self, token: &str) -> Result<User, Error> {
        let user = self
            .store
            .find_session_user(token)
            .await?
            .ok_or_else(|| Error::unauthenticated_error("invalid or expired token"))?;

        if !user.active {
            tracing::warn!(user_id = %user.id, "inactive account rejected");
            return Err(Error::unauthorized_error("account is inactive"));
        }

        Ok(user)
    }
}

#[test]
fn authenticate_resolves_known_active_users() {
    use super::fixtures::World;
    use crate::error::Kind;
    use tokio_test::block_on;
    use uuid::Uuid;

    let world = World::new(4);

    let user = block_on(world.engine.authenticate("driver-token")).unwrap();
    assert_eq!(user.id, world.driver.id);

    let err = block_on(world.engine.authenticate("nope")).unwrap_err();
    assert_eq!(err.kind, Kind::Unauthenticated);

    let mut dormant = User::new(Uuid::new_v4(), "dormant");
    dormant.active = false;
    block_on(world.store.add_user(dormant, "dormant-token"));

    let err = block_on(world.engine.authenticate("dormant-token")).unwrap_err();
    assert_eq!(err.kind, Kind::Forbidden);
}
