//! Data models
//!
//! Records owned by the side-effect components of the orchestrator.

pub mod inventory;
pub mod notification;
pub mod payment;
pub mod profile;
pub mod reward;

pub use inventory::{IngredientStock, RecipeIngredient, StockDeduction};
pub use notification::{
    Channel, ChannelOutcome, DeliveryStatus, Notification, NotificationCategory,
    NotificationEvent, NotificationKind,
};
pub use payment::{GatewayEvent, GatewayEventKind, Payment, PaymentStatus};
pub use profile::{Contact, NotificationPreferences};
pub use reward::{LedgerEntry, LedgerEntryType, RewardAccount, Tier};
