pub mod background;
pub mod jwt;
pub mod password;
pub mod time;

pub use background::*;
pub use jwt::*;
pub use password::*;
pub use time::*;
