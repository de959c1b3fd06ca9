pub mod error;
pub mod forward;
pub mod route;

pub use error::{ErrorBody, ProxyError};
pub use forward::{BodyStream, Forward, ProxyRequest, ProxyResponse, RequestProxy};
pub use route::resolve_route;
