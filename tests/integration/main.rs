//! Integration tests for the JWK set resolution pipeline.

mod pipeline;
mod remote;
mod support;
