//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod audit_log;
pub mod category;
pub mod discount_code;
pub mod discount_rule;
pub mod payment_gateway;
pub mod payment_transaction;
pub mod registration;
pub mod registration_selection;
pub mod registration_type;
pub mod sea_orm_active_enums;

// Re-export specific types to avoid conflicts
pub use audit_log::{Entity as AuditLog, Model as AuditLogModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use discount_code::{Entity as DiscountCode, Model as DiscountCodeModel};
pub use discount_rule::{Entity as DiscountRule, Model as DiscountRuleModel};
pub use payment_gateway::{Entity as PaymentGateway, Model as PaymentGatewayModel};
pub use payment_transaction::{Entity as PaymentTransaction, Model as PaymentTransactionModel};
pub use registration::{Entity as Registration, Model as RegistrationModel};
pub use registration_selection::{
    Entity as RegistrationSelection, Model as RegistrationSelectionModel,
};
pub use registration_type::{Entity as RegistrationType, Model as RegistrationTypeModel};
pub use sea_orm_active_enums::{
    Currency, DiscountScope, DiscountType, HashAlgorithm, PaymentMethod, PaymentStatus,
    RefundStatus, TransactionStatus,
};
