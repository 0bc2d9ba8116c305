pub mod m_http_handler;
