//! Database configuration module for the registration ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written SQL.

use crate::entities::{
    AuditLog, Category, DiscountCode, DiscountRule, PaymentGateway, PaymentTransaction,
    Registration, RegistrationSelection, RegistrationType,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/registration_ledger.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(&get_database_url())
        .await
        .map_err(Into::into)
}

/// Creates all tables that do not exist yet.
///
/// Parents are created before children so engines that check foreign keys at
/// creation time accept the statements.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, Category).await?;
    create_table(db, RegistrationType).await?;
    create_table(db, DiscountCode).await?;
    create_table(db, DiscountRule).await?;
    create_table(db, Registration).await?;
    create_table(db, RegistrationSelection).await?;
    create_table(db, PaymentTransaction).await?;
    create_table(db, PaymentGateway).await?;
    create_table(db, AuditLog).await?;

    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();

    db.execute(builder.build(&statement)).await?;
    Ok(())
}
