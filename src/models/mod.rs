pub mod common;
pub mod payment;
pub mod principal;
pub mod subscription;
pub mod tenant;
