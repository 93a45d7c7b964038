//! Billing Engine - Subscription billing for multi-provider SaaS products
//!
//! Ingests Stripe and PayPal webhooks idempotently, drives the subscription
//! lifecycle and dunning, resolves plan entitlements and meters usage per
//! tenant and calendar month.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
