pub mod ensemble;
pub mod m_session;
pub mod metrics;
pub mod network;
