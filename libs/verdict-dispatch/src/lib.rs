pub mod amqp;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod recovery;
pub mod replies;
pub mod status;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use connection::BrokerConnection;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{DispatchError, StoreError, TransportError};
pub use recovery::RecoverySweep;
pub use status::WorkerStatusTracker;
