pub mod mobile_money;

pub use mobile_money::MobileMoneyGateway;
