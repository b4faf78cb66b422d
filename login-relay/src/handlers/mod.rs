pub mod metrics;
pub mod relay;
pub mod user;

pub use relay::{relay_login, relay_start};
pub use user::login;
