use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated caller as reported by the identity provider.
///
/// `role` is whatever the identity provider stores for display purposes.
/// Authorization never reads it; ownership is always decided by comparing
/// ids with the resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub active: bool,
}

impl User {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: "member".into(),
            active: true,
        }
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id)
            .add_attribute_getter("active", |recv: &User| recv.active)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}
