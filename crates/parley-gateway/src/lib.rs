pub mod broker;
pub mod longpoll;

pub use broker::Broker;
