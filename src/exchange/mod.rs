//! Options exchange integrations.
//!
//! The strategy core talks to the venue through the [`OptionsGateway`]
//! trait only. `DeribitClient` is the live REST implementation; the mock
//! gateway backs the test suite.

mod deribit;
pub mod gateway;
pub mod mock;
mod types;

pub use deribit::DeribitClient;
pub use gateway::OptionsGateway;
pub use mock::MockGateway;
pub use types::*;
