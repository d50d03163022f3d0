//! Payment reconciliation pipeline: watch → extend → reconcile.

pub mod extend;
pub mod reconcile;
pub mod watcher;

pub use extend::{Extension, extend_subscription, extend_subscription_at, next_end_date};
pub use reconcile::{DeviceAction, DeviceOutcome, Reconciled, reconcile_device, restore_service};
pub use watcher::{Confirmation, WatchOutcome, confirm_payment, watch_payment};
