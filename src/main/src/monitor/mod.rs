pub mod fetch;
pub mod m_poller;
pub mod orchestrator;
pub mod prom;
pub mod sink;
