pub mod feed;
pub mod simulator;

pub use feed::ClientFeed;
pub use simulator::Simulator;
