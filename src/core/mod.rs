pub mod error;
pub mod forwarder;
pub mod gateway;
pub mod health;
pub mod route;

pub use error::GatewayError;
pub use forwarder::InboundRequest;
pub use gateway::GatewayService;
pub use health::HealthReporter;
pub use route::{Route, RouteMatch, RouteTable};
