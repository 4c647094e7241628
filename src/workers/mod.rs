pub mod payment_status_poller;
pub mod stock_reconciliation;
