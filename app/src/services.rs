//! Request/response seams between the HTTP resources (or the CLI) and the
//! menu. Each request type names the response it produces; both travel to
//! and from the blocking pool, so they must own their data.

use anyhow::Result;

pub trait Request: Send + 'static {
    type Resp: Send + 'static;
}

/// Read-only requests.
pub trait Queryable<Req: Request> {
    fn query(&self, req: Req) -> Result<Req::Resp>;
}

/// Requests that change what is stored.
pub trait Commandable<Req: Request> {
    fn execute(&self, req: Req) -> Result<Req::Resp>;
}
