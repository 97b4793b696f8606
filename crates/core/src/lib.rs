pub mod contact_store;
pub mod contacts;
pub mod coordinator;
pub mod events;
pub mod gateway;
pub mod health;
pub mod history;
pub mod normalizer;
pub mod profiles;
pub mod schema_model;
pub mod sequencing;
pub mod sql_console;
