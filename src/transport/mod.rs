mod endpoint;
mod http_transport;

pub use endpoint::UpstreamEndpoint;
pub use http_transport::{read_upstream_error, HttpTransport};
