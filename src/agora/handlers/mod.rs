pub mod authentication;
pub mod health;
pub mod posts;
pub mod users;

pub use self::health::health;
