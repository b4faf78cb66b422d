pub mod accounts;
pub mod clock;
pub mod error;
pub mod events;
pub mod hooks;
pub mod login;
pub mod metrics;
pub mod planner;
pub mod relay;
pub mod ring;
pub mod session;
pub mod token;
pub mod urls;

pub use accounts::{AccountStore, InMemoryAccountStore, PgAccountStore};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{RelayError, ServiceError};
pub use events::{LoginEntrySubscriber, LoginEvent, LoginEvents, LoginSubscriber, PostLoginRedirect};
pub use hooks::{NoopHooks, RelayHooks};
pub use planner::{Hop, HopPlanner};
pub use relay::{Authorization, HopState, LoginRelay};
pub use ring::{CurrentDomain, DomainRing, TrustedDomain};
pub use session::{MockSession, SessionAccess};
pub use token::TokenCodec;
pub use urls::UrlBuilder;
