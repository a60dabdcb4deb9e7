pub mod http_client;

pub use http_client::{
    BackendOutcome, BackendResponse, HttpClient, OutboundRequest, TransportFailure,
    TransportFailureKind,
};
