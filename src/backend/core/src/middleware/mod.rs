//! Tower middleware for Campus Core.
pub mod gate;
pub mod security_headers;

pub use gate::{AccessGate, AccessGateLayer, AccessGateService, GateOutcome, GateState, SessionContext};
pub use security_headers::{FrameOptions, SecurityHeadersConfig, SecurityHeadersLayer};
