pub mod callback;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod reference;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use gateway::PaymentGateway;
