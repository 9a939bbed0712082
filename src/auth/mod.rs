pub mod authorizor;
mod capability;
mod user;

pub use capability::Capability;
pub use user::User;
