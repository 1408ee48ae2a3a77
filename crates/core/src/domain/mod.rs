pub mod credential;
pub mod job;
pub mod principal;
pub mod request;
