/// The registration endpoints exposed by the relay.
///
/// Each endpoint forwards to a fixed backend path through its own named upstream. The license
/// and payment flows historically went through two different forwarding helpers, so they are
/// bound to separate upstream names; pointing both names at one backend unifies them.
use std::fmt;

pub const LICENSE_PATH: &str = "/api/organization/register/license";
pub const PAYMENT_PATH: &str = "/api/organization/register/payment";

pub const LICENSE_UPSTREAM: &str = "api";
pub const PAYMENT_UPSTREAM: &str = "api-proxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    License,
    Payment,
}

impl Endpoint {
    pub const ALL: [Endpoint; 2] = [Endpoint::License, Endpoint::Payment];

    /// The backend path requests are forwarded to. Also the inbound route.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::License => LICENSE_PATH,
            Endpoint::Payment => PAYMENT_PATH,
        }
    }

    /// Name of the upstream in the upstreams file that serves this endpoint.
    pub fn upstream(self) -> &'static str {
        match self {
            Endpoint::License => LICENSE_UPSTREAM,
            Endpoint::Payment => PAYMENT_UPSTREAM,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::License => f.write_str("license"),
            Endpoint::Payment => f.write_str("payment"),
        }
    }
}
