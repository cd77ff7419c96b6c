pub mod ledger_service;
pub mod lodgement;
pub mod refund_validator;
