//! Payment gateway adapter - request signing, callback verification, and gateway configuration.
//!
//! [`GatewayProtocol`] is the seam for a bank's signing scheme. [`ThreeDPayProtocol`] implements
//! the reference bank's 3-D Secure "pay" model: the participant's browser posts a signed form
//! straight to the bank, and the bank posts the result back to our callback URL.

use crate::{
    core::{
        audit::{self, AuditEntry},
        hashing::{CallbackFields, SecretCipher, verify_callback_hash},
        ledger::Outcome,
        money::format_bank_amount,
    },
    entities::{Currency, HashAlgorithm, PaymentGateway, payment_gateway},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use std::fmt;

/// 3-D Secure statuses that mean the cardholder was authenticated (fully or by attempt).
pub const APPROVED_MD_STATUSES: &[&str] = &["1", "2", "3", "4"];

/// Processor return code for an approved authorization.
pub const APPROVED_RETURN_CODE: &str = "00";

/// A gateway configuration with its secret decrypted for signing.
#[derive(Clone)]
pub struct GatewayCredentials {
    /// Configuration name, copied onto ledger rows
    pub name: String,
    /// Merchant id
    pub shop_id: String,
    /// Decrypted store key
    pub secret: String,
    /// Digest scheme
    pub hash_algorithm: HashAlgorithm,
    /// Endpoint the signed form posts to
    pub endpoint: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("name", &self.name)
            .field("shop_id", &self.shop_id)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GatewayCredentials {
    /// Decrypts a stored configuration.
    pub fn unlock(gateway: &payment_gateway::Model, cipher: &SecretCipher) -> Result<Self> {
        Ok(Self {
            name: gateway.name.clone(),
            shop_id: gateway.shop_id.clone(),
            secret: cipher.decrypt(&gateway.encrypted_secret)?,
            hash_algorithm: gateway.hash_algorithm,
            endpoint: gateway.endpoint().to_string(),
        })
    }
}

/// Card data for one attempt. Never persisted, never logged.
#[derive(Clone)]
pub struct CardDetails {
    /// Digits only
    pub number: String,
    /// 1-12
    pub expiry_month: u32,
    /// Two-digit year
    pub expiry_year: u32,
    /// Three or four digits
    pub cvv: String,
    /// Name as printed on the card
    pub holder: String,
}

impl CardDetails {
    /// First six and last four digits, the rest starred out.
    #[must_use]
    pub fn masked(&self) -> String {
        let len = self.number.len();
        if len < 10 {
            return "*".repeat(len);
        }
        format!(
            "{}{}{}",
            &self.number[..6],
            "*".repeat(len - 10),
            &self.number[len - 4..]
        )
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &self.masked())
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}

/// Everything needed to sign one outbound request.
#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    /// Ledger key, sent as `oid`
    pub order_id: &'a str,
    /// Amount to charge
    pub amount: f64,
    /// Charge currency, sent as its ISO numeric code
    pub currency: Currency,
    /// Card to charge; never stored
    pub card: &'a CardDetails,
    /// Where the bank posts approved results
    pub ok_url: &'a str,
    /// Where the bank posts declined results
    pub fail_url: &'a str,
    /// Language of the bank pages
    pub language: &'a str,
    /// Per-request random value mixed into the digest
    pub rnd: String,
}

/// A signed form ready to be posted to the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedForm {
    /// Bank endpoint
    pub action: String,
    /// Field name/value pairs, in the order they are emitted
    pub fields: Vec<(String, String)>,
}

impl SignedForm {
    /// Value of a field, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Renders an HTML document that submits the form as soon as it loads.
    #[must_use]
    pub fn render_html(&self) -> String {
        let inputs: String = self
            .fields
            .iter()
            .map(|(name, value)| {
                format!(
                    "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
                    escape_html(name),
                    escape_html(value)
                )
            })
            .collect();

        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Redirecting to the bank</title></head>\n\
             <body onload=\"document.forms[0].submit()\">\n\
             <form method=\"post\" action=\"{}\">\n{inputs}\
             <noscript><button type=\"submit\">Continue</button></noscript>\n\
             </form>\n</body>\n</html>\n",
            escape_html(&self.action)
        )
    }
}

/// Escapes text for use inside an HTML attribute or element.
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// A bank's signing and verification scheme.
pub trait GatewayProtocol: Send + Sync {
    /// Builds and signs the form for an outbound payment.
    fn build_request(&self, credentials: &GatewayCredentials, request: &PaymentRequest<'_>) -> SignedForm;

    /// Authenticates a callback and reads the bank's verdict.
    ///
    /// An `Err` means the callback could not be trusted; `Ok(Declined)` means it was authentic
    /// and the bank refused the payment.
    fn verify_callback(&self, credentials: &GatewayCredentials, fields: &CallbackFields) -> Result<Outcome>;
}

/// The reference bank's 3-D Secure "pay" model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeDPayProtocol;

impl ThreeDPayProtocol {
    const STORE_TYPE: &'static str = "3d_pay";
    const TRANSACTION_TYPE: &'static str = "Auth";
    /// Single payment, no installments
    const INSTALLMENTS: &'static str = "";
}

impl GatewayProtocol for ThreeDPayProtocol {
    fn build_request(&self, credentials: &GatewayCredentials, request: &PaymentRequest<'_>) -> SignedForm {
        let amount = format_bank_amount(request.amount);

        let signed = [
            credentials.shop_id.as_str(),
            request.order_id,
            amount.as_str(),
            request.ok_url,
            request.fail_url,
            Self::TRANSACTION_TYPE,
            Self::INSTALLMENTS,
            request.rnd.as_str(),
        ]
        .concat();
        let hash = credentials.hash_algorithm.digest(&signed, &credentials.secret);

        let fields = [
            ("clientid", credentials.shop_id.clone()),
            ("storetype", Self::STORE_TYPE.to_string()),
            ("islemtipi", Self::TRANSACTION_TYPE.to_string()),
            ("amount", amount),
            ("currency", request.currency.iso_numeric().to_string()),
            ("oid", request.order_id.to_string()),
            ("okUrl", request.ok_url.to_string()),
            ("failUrl", request.fail_url.to_string()),
            ("lang", request.language.to_string()),
            ("rnd", request.rnd.clone()),
            ("taksit", Self::INSTALLMENTS.to_string()),
            ("hash", hash),
            ("pan", request.card.number.clone()),
            (
                "Ecom_Payment_Card_ExpDate_Month",
                format!("{:02}", request.card.expiry_month),
            ),
            (
                "Ecom_Payment_Card_ExpDate_Year",
                format!("{:02}", request.card.expiry_year),
            ),
            ("cv2", request.card.cvv.clone()),
            ("cardHolderName", request.card.holder.clone()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        SignedForm {
            action: credentials.endpoint.clone(),
            fields,
        }
    }

    fn verify_callback(&self, credentials: &GatewayCredentials, fields: &CallbackFields) -> Result<Outcome> {
        verify_callback_hash(fields, &credentials.secret, credentials.hash_algorithm)?;

        let md_status = fields.get("mdStatus").unwrap_or_default();
        let return_code = fields.get("ProcReturnCode").unwrap_or_default();

        if APPROVED_MD_STATUSES.contains(&md_status) && return_code == APPROVED_RETURN_CODE {
            return Ok(Outcome::Approved {
                bank_transaction_id: fields.non_empty("TransId").map(ToString::to_string),
                auth_code: fields.non_empty("AuthCode").map(ToString::to_string),
                card_brand: fields.non_empty("EXTRA.CARDBRAND").map(ToString::to_string),
            });
        }

        let error_code = if APPROVED_MD_STATUSES.contains(&md_status) {
            return_code.to_string()
        } else {
            format!("MD_STATUS_{md_status}")
        };
        let error_message = fields
            .non_empty("ErrMsg")
            .or_else(|| fields.non_empty("mdErrorMsg"))
            .unwrap_or("Payment declined by the bank")
            .to_string();

        Ok(Outcome::Declined {
            error_code,
            error_message,
        })
    }
}

/// Finds the single active gateway configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveGatewaySelector;

impl ActiveGatewaySelector {
    /// The active gateway, or None when every gateway is disabled.
    ///
    /// More than one active row is a [`Error::CorruptState`].
    pub async fn select<C>(db: &C) -> Result<Option<payment_gateway::Model>>
    where
        C: ConnectionTrait,
    {
        let mut active = PaymentGateway::find()
            .filter(payment_gateway::Column::IsActive.eq(true))
            .all(db)
            .await?;

        match active.len() {
            0 => Ok(None),
            1 => Ok(active.pop()),
            n => Err(Error::CorruptState {
                message: format!("{n} payment gateways are active"),
            }),
        }
    }

    /// The active gateway, failing with [`Error::NoActiveGateway`] when there is none.
    pub async fn require<C>(db: &C) -> Result<payment_gateway::Model>
    where
        C: ConnectionTrait,
    {
        Self::select(db).await?.ok_or(Error::NoActiveGateway)
    }
}

/// Operator input for creating or replacing a gateway configuration.
#[derive(Clone, Deserialize)]
pub struct GatewaySettings {
    /// Unique configuration name
    pub name: String,
    /// Bank the configuration targets
    pub bank_code: String,
    /// Merchant (client) id issued by the bank
    pub shop_id: String,
    /// Plaintext store key; encrypted before it is stored
    pub secret: String,
    /// Digest scheme the bank expects
    pub hash_algorithm: HashAlgorithm,
    /// Post to `test_url` instead of `production_url`
    pub test_mode: bool,
    /// Bank test endpoint
    pub test_url: String,
    /// Bank production endpoint
    pub production_url: String,
    /// Make this the only active gateway
    pub activate: bool,
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("name", &self.name)
            .field("bank_code", &self.bank_code)
            .field("test_mode", &self.test_mode)
            .field("activate", &self.activate)
            .finish_non_exhaustive()
    }
}

/// Creates or replaces the configuration named `settings.name`.
///
/// The secret is encrypted before storage. Activating a gateway deactivates every other one
/// in the same transaction.
pub async fn configure_gateway(
    db: &DatabaseConnection,
    cipher: &SecretCipher,
    settings: GatewaySettings,
    actor: Option<&str>,
) -> Result<payment_gateway::Model> {
    let name = settings.name.trim().to_string();
    if name.is_empty() || settings.shop_id.trim().is_empty() || settings.secret.is_empty() {
        return Err(Error::validation(
            "Gateway name, shop id and secret are required",
        ));
    }
    let endpoint = if settings.test_mode {
        &settings.test_url
    } else {
        &settings.production_url
    };
    if !endpoint.starts_with("https://") {
        return Err(Error::validation("Gateway endpoint must be an https URL"));
    }

    let encrypted_secret = cipher.encrypt(&settings.secret)?;

    let txn = db.begin().await?;

    if settings.activate {
        PaymentGateway::update_many()
            .set(payment_gateway::ActiveModel {
                is_active: Set(false),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(payment_gateway::Column::Name.ne(name.as_str()))
            .filter(payment_gateway::Column::IsActive.eq(true))
            .exec(&txn)
            .await?;
    }

    let existing = PaymentGateway::find()
        .filter(payment_gateway::Column::Name.eq(name.as_str()))
        .one(&txn)
        .await?;

    let mut model = existing
        .clone()
        .map_or_else(
            || payment_gateway::ActiveModel {
                ..Default::default()
            },
            Into::into,
        );
    model.name = Set(name);
    model.bank_code = Set(settings.bank_code.trim().to_string());
    model.shop_id = Set(settings.shop_id.trim().to_string());
    model.encrypted_secret = Set(encrypted_secret);
    model.hash_algorithm = Set(settings.hash_algorithm);
    model.test_mode = Set(settings.test_mode);
    model.test_url = Set(settings.test_url);
    model.production_url = Set(settings.production_url);
    model.is_active = Set(settings.activate || existing.as_ref().is_some_and(|g| g.is_active));
    model.updated_at = Set(Utc::now());

    let saved = if existing.is_some() {
        model.update(&txn).await?
    } else {
        model.insert(&txn).await?
    };

    audit::record(
        &txn,
        AuditEntry::change(
            "payment_gateways",
            saved.id,
            "configure",
            actor,
            existing.as_ref(),
            &saved,
        )?,
    )
    .await?;

    txn.commit().await?;

    tracing::info!(
        gateway = %saved.name,
        bank_code = %saved.bank_code,
        test_mode = saved.test_mode,
        active = saved.is_active,
        "Payment gateway configured"
    );
    Ok(saved)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    fn card() -> CardDetails {
        CardDetails {
            number: "4508034508034509".to_string(),
            expiry_month: 3,
            expiry_year: 30,
            cvv: "000".to_string(),
            holder: "Ada Lovelace".to_string(),
        }
    }

    fn credentials() -> GatewayCredentials {
        GatewayCredentials {
            name: "reference".to_string(),
            shop_id: "100200300".to_string(),
            secret: "STOREKEY".to_string(),
            hash_algorithm: HashAlgorithm::Sha1Base64,
            endpoint: "https://bank.test/fim/est3Dgate".to_string(),
        }
    }

    #[test]
    fn test_masked_card() {
        assert_eq!(card().masked(), "450803******4509");
        let debug = format!("{:?}", card());
        assert!(!debug.contains("4508034508034509"));
        assert!(!debug.contains("000"));
    }

    #[test]
    fn test_build_request_signs_documented_order() {
        let card = card();
        let request = PaymentRequest {
            order_id: "ORD1",
            amount: 1200.0,
            currency: Currency::Try,
            card: &card,
            ok_url: "https://site.test/cb",
            fail_url: "https://site.test/cb",
            language: "tr",
            rnd: "R1".to_string(),
        };
        let form = ThreeDPayProtocol.build_request(&credentials(), &request);

        let expected = HashAlgorithm::Sha1Base64.digest(
            "100200300ORD11200.00https://site.test/cbhttps://site.test/cbAuthR1",
            "STOREKEY",
        );
        assert_eq!(form.field("hash"), Some(expected.as_str()));
        assert_eq!(form.field("amount"), Some("1200.00"));
        assert_eq!(form.field("currency"), Some("949"));
        assert_eq!(form.field("Ecom_Payment_Card_ExpDate_Month"), Some("03"));
        assert_eq!(form.action, "https://bank.test/fim/est3Dgate");
        assert!(form.fields.iter().all(|(_, v)| !v.contains("STOREKEY")));
    }

    #[test]
    fn test_render_html_escapes_values() {
        let form = SignedForm {
            action: "https://bank.test/?a=1&b=2".to_string(),
            fields: vec![("cardHolderName".to_string(), "\"><script>".to_string())],
        };
        let html = form.render_html();
        assert!(html.contains("action=\"https://bank.test/?a=1&amp;b=2\""));
        assert!(html.contains("value=\"&quot;&gt;&lt;script&gt;\""));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_verify_callback_verdicts() {
        let creds = credentials();

        let approved = signed_callback(&creds.secret, "ORD1", "00", "1");
        assert!(matches!(
            ThreeDPayProtocol.verify_callback(&creds, &approved).unwrap(),
            Outcome::Approved { .. }
        ));

        let declined = signed_callback(&creds.secret, "ORD1", "05", "1");
        assert_eq!(
            ThreeDPayProtocol.verify_callback(&creds, &declined).unwrap(),
            Outcome::Declined {
                error_code: "05".to_string(),
                error_message: "Payment declined by the bank".to_string(),
            }
        );

        let not_authenticated = signed_callback(&creds.secret, "ORD1", "00", "0");
        assert!(matches!(
            ThreeDPayProtocol.verify_callback(&creds, &not_authenticated).unwrap(),
            Outcome::Declined { error_code, .. } if error_code == "MD_STATUS_0"
        ));

        let forged = signed_callback("WRONGKEY", "ORD1", "00", "1");
        assert!(matches!(
            ThreeDPayProtocol.verify_callback(&creds, &forged),
            Err(Error::Security { .. })
        ));
    }

    #[tokio::test]
    async fn test_selector_none_and_one() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(ActiveGatewaySelector::select(&db).await?.is_none());
        assert!(matches!(
            ActiveGatewaySelector::require(&db).await,
            Err(Error::NoActiveGateway)
        ));

        let cipher = test_cipher();
        configure_gateway(&db, &cipher, test_gateway_settings("first", true), None).await?;
        let active = ActiveGatewaySelector::require(&db).await?;
        assert_eq!(active.name, "first");
        assert_ne!(active.encrypted_secret, "STOREKEY");
        assert_eq!(cipher.decrypt(&active.encrypted_secret)?, "STOREKEY");
        Ok(())
    }

    #[tokio::test]
    async fn test_activation_is_exclusive() -> Result<()> {
        let db = setup_test_db().await?;
        let cipher = test_cipher();
        configure_gateway(&db, &cipher, test_gateway_settings("first", true), None).await?;
        configure_gateway(&db, &cipher, test_gateway_settings("second", true), None).await?;

        let active = ActiveGatewaySelector::require(&db).await?;
        assert_eq!(active.name, "second");

        // reconfiguring without activation keeps the current active flag
        configure_gateway(&db, &cipher, test_gateway_settings("first", false), None).await?;
        assert_eq!(ActiveGatewaySelector::require(&db).await?.name, "second");
        Ok(())
    }

    #[tokio::test]
    async fn test_two_active_rows_is_corrupt() -> Result<()> {
        let db = setup_test_db().await?;
        let cipher = test_cipher();
        configure_gateway(&db, &cipher, test_gateway_settings("first", true), None).await?;
        configure_gateway(&db, &cipher, test_gateway_settings("second", false), None).await?;
        PaymentGateway::update_many()
            .set(payment_gateway::ActiveModel {
                is_active: Set(true),
                ..Default::default()
            })
            .exec(&db)
            .await?;

        assert!(matches!(
            ActiveGatewaySelector::select(&db).await,
            Err(Error::CorruptState { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_reconfigure_updates_existing_row() -> Result<()> {
        let db = setup_test_db().await?;
        let cipher = test_cipher();
        let first = configure_gateway(&db, &cipher, test_gateway_settings("first", true), None).await?;

        let mut settings = test_gateway_settings("first", false);
        settings.secret = "NEWKEY".to_string();
        settings.shop_id = "999".to_string();
        let updated = configure_gateway(&db, &cipher, settings, Some("ops")).await?;

        assert_eq!(updated.id, first.id);
        assert_eq!(updated.shop_id, "999");
        assert!(updated.is_active);
        assert_eq!(cipher.decrypt(&updated.encrypted_secret)?, "NEWKEY");
        assert_eq!(PaymentGateway::find().all(&db).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_configure_rejects_plain_http() -> Result<()> {
        let db = setup_test_db().await?;
        let mut settings = test_gateway_settings("first", true);
        settings.test_url = "http://bank.test".to_string();
        assert!(matches!(
            configure_gateway(&db, &test_cipher(), settings, None).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }
}
