pub mod auth;
pub mod health;
pub mod listings;

pub use auth::login;
pub use health::health;
pub use listings::{list_enigma_devices, list_lines, list_mag_devices, list_payments};
