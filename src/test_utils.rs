//! Shared test utilities for the registration ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

#![allow(clippy::expect_used)]

use crate::{
    config::CurrencyConfig,
    core::{
        discount::{self, NewDiscountCode, NewDiscountRule},
        gateway::GatewaySettings,
        hashing::{CallbackFields, SecretCipher, reduce_hash_params},
        ledger::{self, NewAttempt, Outcome},
        payment::PaymentInitiation,
        pricing::SelectionRequest,
        registration::{self, NewRegistration, PaymentChoice},
    },
    entities::{
        Category, Currency, DiscountScope, DiscountType, HashAlgorithm, PaymentMethod, RegistrationType,
        category, discount_code, payment_transaction, registration as registration_entity,
        registration_selection, registration_type,
    },
    errors::{Error, Result},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

/// Store key configured on test gateways.
pub const TEST_GATEWAY_SECRET: &str = "STOREKEY";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
///
/// The pool holds a single connection so every task sees the same in-memory database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a shared-cache in-memory `SQLite` database served by `connections` pooled
/// connections, so concurrent transactions run on separate connections and interleave.
///
/// Lock conflicts between writers surface as [`Error::Database`]; callers retry them.
pub async fn setup_concurrent_test_db(connections: u32) -> Result<DatabaseConnection> {
    let name = Uuid::new_v4().simple();
    let mut options = ConnectOptions::new(format!("sqlite:file:{name}?mode=memory&cache=shared"));
    options
        .max_connections(connections)
        .min_connections(connections)
        .sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates an open category with sensible defaults.
///
/// # Defaults
/// * no registration or early-bird window
/// * capacity tracking enabled
pub async fn create_test_category(db: &DatabaseConnection, name: &str) -> Result<category::Model> {
    create_custom_category(db, name, false, None, None, true).await
}

/// Creates a category with a custom early-bird window and tracking flag.
pub async fn create_custom_category(
    db: &DatabaseConnection,
    name: &str,
    early_bird_enabled: bool,
    early_bird_start: Option<DateTime<Utc>>,
    early_bird_end: Option<DateTime<Utc>>,
    capacity_tracking_enabled: bool,
) -> Result<category::Model> {
    category::ActiveModel {
        name: Set(name.to_string()),
        registration_start: Set(None),
        registration_end: Set(None),
        early_bird_enabled: Set(early_bird_enabled),
        early_bird_start: Set(early_bird_start),
        early_bird_end: Set(early_bird_end),
        capacity_tracking_enabled: Set(capacity_tracking_enabled),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Ends a category's registration window at `end`.
pub async fn close_registration_window(
    db: &DatabaseConnection,
    category_id: i64,
    end: DateTime<Utc>,
) -> Result<category::Model> {
    let existing = Category::find_by_id(category_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Category", category_id))?;
    let mut model: category::ActiveModel = existing.into();
    model.registration_end = Set(Some(end));
    model.update(db).await.map_err(Into::into)
}

/// Creates a registration type with custom lira pricing.
///
/// Dollar and euro prices are derived as a thirtieth of the lira price.
pub async fn create_custom_type(
    db: &DatabaseConnection,
    category_id: i64,
    fee_try: f64,
    early_bird_fee_try: Option<f64>,
    vat_rate: f64,
    capacity: Option<i32>,
) -> Result<registration_type::Model> {
    registration_type::ActiveModel {
        category_id: Set(category_id),
        name: Set(format!("Type {fee_try}")),
        fee_try: Set(fee_try),
        fee_usd: Set(fee_try / 30.0),
        fee_eur: Set(fee_try / 30.0),
        early_bird_fee_try: Set(early_bird_fee_try),
        early_bird_fee_usd: Set(None),
        vat_rate: Set(vat_rate),
        capacity: Set(capacity),
        current_registrations: Set(0),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Sets up a database with one tracked category and one type.
///
/// # Defaults
/// * fee: 1000.0 TRY
/// * VAT: 0.20
pub async fn setup_with_type(
    capacity: Option<i32>,
) -> Result<(DatabaseConnection, category::Model, registration_type::Model)> {
    let db = setup_test_db().await?;
    let category = create_test_category(&db, "Congress").await?;
    let reg_type = create_custom_type(&db, category.id, 1000.0, None, 0.20, capacity).await?;
    Ok((db, category, reg_type))
}

/// Current seat count of a type.
pub async fn type_occupancy(db: &DatabaseConnection, type_id: i64) -> Result<i32> {
    RegistrationType::find_by_id(type_id)
        .one(db)
        .await?
        .map(|t| t.current_registrations)
        .ok_or_else(|| Error::not_found("Registration type", type_id))
}

/// Creates an unlimited type-scoped code with a single rule.
pub async fn create_type_scoped_code(
    db: &DatabaseConnection,
    code: &str,
    type_id: i64,
    discount_type: DiscountType,
    discount_value: f64,
) -> Result<discount_code::Model> {
    discount::create_discount_code(
        db,
        NewDiscountCode {
            code: code.to_string(),
            scope: DiscountScope::RegistrationType,
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            rules: vec![NewDiscountRule {
                target_id: type_id,
                discount_type,
                discount_value,
            }],
        },
    )
    .await
}

/// Creates a type-scoped 100% code with a usage limit.
pub async fn create_limited_code(
    db: &DatabaseConnection,
    code: &str,
    type_id: i64,
    usage_limit: i32,
) -> Result<discount_code::Model> {
    discount::create_discount_code(
        db,
        NewDiscountCode {
            code: code.to_string(),
            scope: DiscountScope::RegistrationType,
            valid_from: None,
            valid_until: None,
            usage_limit: Some(usage_limit),
            rules: vec![NewDiscountRule {
                target_id: type_id,
                discount_type: DiscountType::Percent,
                discount_value: 100.0,
            }],
        },
    )
    .await
}

/// A fixed-key cipher for tests.
#[must_use]
pub fn test_cipher() -> SecretCipher {
    SecretCipher::from_base64_key(&STANDARD.encode([7u8; 32])).expect("32-byte test key")
}

/// Gateway settings pointing at a test endpoint, signing with SHA-1.
#[must_use]
pub fn test_gateway_settings(name: &str, activate: bool) -> GatewaySettings {
    GatewaySettings {
        name: name.to_string(),
        bank_code: "reference".to_string(),
        shop_id: "100200300".to_string(),
        secret: TEST_GATEWAY_SECRET.to_string(),
        hash_algorithm: HashAlgorithm::Sha1Base64,
        test_mode: true,
        test_url: "https://bank.test/fim/est3Dgate".to_string(),
        production_url: "https://bank.example/fim/est3Dgate".to_string(),
        activate,
    }
}

/// Sets up a database with one active gateway.
pub async fn setup_with_gateway() -> Result<(DatabaseConnection, SecretCipher)> {
    let db = setup_test_db().await?;
    let cipher = test_cipher();
    crate::core::gateway::configure_gateway(
        &db,
        &cipher,
        test_gateway_settings("reference", true),
        None,
    )
    .await?;
    Ok((db, cipher))
}

/// A valid card payment request.
#[must_use]
pub fn test_initiation(amount: f64) -> PaymentInitiation {
    PaymentInitiation {
        amount,
        currency: Currency::Try,
        card_number: "4508034508034509".to_string(),
        card_expiry: "12/99".to_string(),
        card_cvv: "000".to_string(),
        card_holder_name: "Ada Lovelace".to_string(),
        form_submission_id: None,
    }
}

/// A bank callback signed with `secret`.
///
/// The hash covers client id, order id, auth code, return code, response, 3-D status and rnd.
#[must_use]
pub fn signed_callback(secret: &str, order_id: &str, proc_return_code: &str, md_status: &str) -> CallbackFields {
    let response = if proc_return_code == "00" {
        "Approved"
    } else {
        "Declined"
    };
    let mut fields: CallbackFields = [
        ("clientid", "100200300"),
        ("oid", order_id),
        ("AuthCode", "P12345"),
        ("ProcReturnCode", proc_return_code),
        ("Response", response),
        ("mdStatus", md_status),
        ("rnd", "r4nd0m"),
        ("TransId", "26001ABC"),
    ]
    .into_iter()
    .collect();

    let params = "clientid:oid:AuthCode:ProcReturnCode:Response:mdStatus:rnd:";
    let values = reduce_hash_params(params, &fields).expect("allow-listed params");
    let hash = HashAlgorithm::Sha1Base64.digest(&values, secret);
    fields.insert("HASHPARAMS", params);
    fields.insert("HASHPARAMSVAL", values);
    fields.insert("HASH", hash);
    fields
}

/// Encodes callback fields the way the bank's browser form posts them.
#[must_use]
pub fn fields_to_form(fields: &CallbackFields) -> String {
    serde_urlencoded::to_string(fields.iter().collect::<Vec<_>>()).expect("string pairs encode")
}

/// A pending attempt on the test gateway.
#[must_use]
pub fn test_attempt(order_id: &str, amount: f64) -> NewAttempt {
    NewAttempt {
        order_id: order_id.to_string(),
        gateway_name: "reference".to_string(),
        amount,
        currency: Currency::Try,
        card_holder: Some("Ada Lovelace".to_string()),
        masked_card: Some("450803******4509".to_string()),
        form_submission_id: None,
    }
}

/// Opens and approves an attempt, as a verified bank callback would.
pub async fn create_successful_payment(
    db: &DatabaseConnection,
    order_id: &str,
    amount: f64,
    currency: Currency,
) -> Result<payment_transaction::Model> {
    let mut attempt = test_attempt(order_id, amount);
    attempt.currency = currency;
    ledger::open(db, attempt).await?;
    let finalized = ledger::finalize(
        db,
        order_id,
        Outcome::Approved {
            bank_transaction_id: Some(format!("T-{order_id}")),
            auth_code: Some("P12345".to_string()),
            card_brand: Some("VISA".to_string()),
        },
    )
    .await?;
    Ok(finalized.transaction)
}

/// A bank-transfer registration for one selection.
#[must_use]
pub fn bank_transfer_request(category_id: i64, type_id: i64) -> NewRegistration {
    NewRegistration {
        full_name: "Ada Lovelace".to_string(),
        email: "ada@example.org".to_string(),
        currency: Currency::Try,
        selections: vec![SelectionRequest {
            category_id,
            registration_type_id: type_id,
        }],
        discount_code: None,
        payment: PaymentChoice::BankTransfer,
    }
}

/// A committed registration and everything it was built from.
pub struct RegistrationFixture {
    /// Database holding the fixture
    pub db: DatabaseConnection,
    /// Category of every selection
    pub category: category::Model,
    /// One type per selection, in selection order
    pub types: Vec<registration_type::Model>,
    /// Committed registration
    pub registration: registration_entity::Model,
    /// Its selections, one per type
    pub selections: Vec<registration_selection::Model>,
}

/// Creates a registration with `selections` lines of 1000 TRY + 20% VAT each, on unlimited types.
///
/// Card registrations are paid in full; bank-transfer registrations are unpaid.
pub async fn setup_with_registration(method: PaymentMethod, selections: usize) -> Result<RegistrationFixture> {
    setup_with_registration_capacity(method, selections, None).await
}

/// Like [`setup_with_registration`], with a capacity on every type.
pub async fn setup_with_registration_capacity(
    method: PaymentMethod,
    selections: usize,
    capacity: Option<i32>,
) -> Result<RegistrationFixture> {
    let db = setup_test_db().await?;
    let category = create_test_category(&db, "Congress").await?;

    let mut types = Vec::with_capacity(selections);
    for _ in 0..selections {
        types.push(create_custom_type(&db, category.id, 1000.0, None, 0.20, capacity).await?);
    }

    let payment = match method {
        PaymentMethod::Card => {
            let amount = 1200.0 * f64::from(u32::try_from(selections).expect("small fixture"));
            create_successful_payment(&db, "ORDFIXTURE", amount, Currency::Try).await?;
            PaymentChoice::Card {
                order_id: "ORDFIXTURE".to_string(),
            }
        }
        PaymentMethod::BankTransfer => PaymentChoice::BankTransfer,
    };

    let request = NewRegistration {
        selections: types
            .iter()
            .map(|t| SelectionRequest {
                category_id: category.id,
                registration_type_id: t.id,
            })
            .collect(),
        payment,
        ..bank_transfer_request(category.id, 0)
    };
    let details = registration::create_registration(&db, &CurrencyConfig::default(), request, None).await?;

    Ok(RegistrationFixture {
        db,
        category,
        types,
        registration: details.registration,
        selections: details.selections,
    })
}
