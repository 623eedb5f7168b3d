//! OData client for the listing feed

pub mod client;
pub mod token;

pub use client::{ODataClient, ODataResponse, QueryOptions};
pub use token::TokenCache;
