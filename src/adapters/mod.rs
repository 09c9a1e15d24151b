pub mod event_bus;
pub mod fault_injector;
pub mod health_handler;
pub mod live_channel;
pub mod metrics_handler;
pub mod mock_handler;
pub mod reload;
pub mod table_builder;
pub mod table_store;
pub mod webhook;

#[cfg(test)]
mod webhook_test;
