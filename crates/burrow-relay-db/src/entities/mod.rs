//! Database entities

pub mod client_session;

pub use client_session::Entity as ClientSession;

pub mod prelude {
    pub use super::client_session::Entity as ClientSession;
}
