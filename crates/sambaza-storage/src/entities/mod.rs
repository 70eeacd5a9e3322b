pub mod api_key;
pub mod audit_log;
pub mod campaign;
pub mod campaign_message;
pub mod contact;
pub mod mpesa_transaction;
pub mod service;
pub mod service_activation;
pub mod survey;
pub mod survey_response;
pub mod ticket;
pub mod ussd_menu;
pub mod ussd_session_log;
pub mod user;
pub mod webhook_delivery;
pub mod webhook_endpoint;
