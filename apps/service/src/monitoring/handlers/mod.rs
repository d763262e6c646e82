//! Built-in probe strategies, one per connection type

mod container;
mod http;
mod ping;
mod tcp;

pub use container::ContainerHandler;
pub use http::HttpHandler;
pub use ping::PingHandler;
pub use tcp::TcpHandler;
