pub mod invocation;
pub mod rest;
