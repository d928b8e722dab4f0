//! # Tour Request Telegram Bot
//!
//! A Telegram bot that walks travellers through a seven-question tour
//! request, stores each completed request, copies it to a spreadsheet and
//! notifies an operator, who can query and export requests with admin
//! commands.

pub mod bot;
pub mod config;
pub mod db;
pub mod delivery;
pub mod dialogue;
pub mod errors;
pub mod export;
pub mod localization;
pub mod messenger;
pub mod notification;
pub mod reporting;
pub mod sheets;
pub mod store;
pub mod survey;
pub mod throttle;
pub mod validation;
