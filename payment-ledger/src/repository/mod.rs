pub mod memory;
pub mod payment_repository;
pub mod refund_repository;
