pub mod account;
pub mod flow;

pub use account::{Account, AccountId, ANONYMOUS_ACCOUNT_ID};
pub use flow::{Fingerprint, RelayParams, RequestUrl};
