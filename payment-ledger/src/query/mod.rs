pub mod payment_filter;
