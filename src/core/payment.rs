//! Payment orchestration - card validation, signed-form initiation, and callback handling.

use crate::{
    config::PaymentConfig,
    core::{
        gateway::{ActiveGatewaySelector, CardDetails, GatewayCredentials, GatewayProtocol, PaymentRequest, SignedForm},
        hashing::{CallbackFields, SecretCipher},
        ledger::{self, NewAttempt, Outcome},
        money::round2,
    },
    entities::{Currency, PaymentGateway, TransactionStatus, payment_gateway},
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, Utc};
use sea_orm::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error code stored when a callback fails authentication.
pub const SECURITY_ERROR_CODE: &str = "SECURITY_ERROR";

/// Participant input to start a card payment.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    /// Amount to charge
    pub amount: f64,
    /// Charge currency
    pub currency: Currency,
    /// Card number; spaces and dashes are ignored
    pub card_number: String,
    /// `MM/YY`
    pub card_expiry: String,
    /// Three or four digits
    pub card_cvv: String,
    /// Name on the card
    pub card_holder_name: String,
    /// Client form the payment belongs to
    pub form_submission_id: Option<String>,
}

impl std::fmt::Debug for PaymentInitiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentInitiation")
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .field("form_submission_id", &self.form_submission_id)
            .finish_non_exhaustive()
    }
}

/// A started payment: the ledger row exists and the form is ready.
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    /// Ledger key of the attempt
    pub order_id: String,
    /// Signed fields for the bank
    pub form: SignedForm,
    /// Auto-submitting document for the participant's browser
    pub html_content: String,
}

/// Luhn checksum over a string of ASCII digits.
#[must_use]
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Validates raw card input.
///
/// Spaces and dashes in the number are ignored. The card must not expire before the
/// current month.
pub fn parse_card(
    number: &str,
    expiry: &str,
    cvv: &str,
    holder: &str,
    now: DateTime<Utc>,
) -> Result<CardDetails> {
    let number: String = number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    if !(12..=19).contains(&number.len()) || !luhn_valid(&number) {
        return Err(Error::validation("Card number is invalid"));
    }

    let (month, year) = expiry
        .trim()
        .split_once('/')
        .filter(|(m, y)| m.len() == 2 && y.len() == 2)
        .and_then(|(m, y)| Some((m.parse::<u32>().ok()?, y.parse::<u32>().ok()?)))
        .filter(|(m, _)| (1..=12).contains(m))
        .ok_or_else(|| Error::validation("Card expiry must be MM/YY"))?;

    let current = (now.year() % 100, now.month());
    let expiry_key = (i32::try_from(year).unwrap_or(i32::MAX), month);
    if expiry_key < current {
        return Err(Error::validation("Card has expired"));
    }

    let cvv = cvv.trim();
    if !(3..=4).contains(&cvv.len()) || !cvv.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::validation("Card security code is invalid"));
    }

    let holder = holder.trim();
    if holder.is_empty() {
        return Err(Error::validation("Card holder name is required"));
    }

    Ok(CardDetails {
        number,
        expiry_month: month,
        expiry_year: year,
        cvv: cvv.to_string(),
        holder: holder.to_string(),
    })
}

/// Starts a card payment against the active gateway.
///
/// The `pending` ledger row is written before the form is returned, so an attempt the bank
/// never answers still leaves a record. Only the masked card number is stored.
pub async fn initiate_payment(
    db: &DatabaseConnection,
    cipher: &SecretCipher,
    protocol: &dyn GatewayProtocol,
    config: &PaymentConfig,
    request: PaymentInitiation,
) -> Result<InitiatedPayment> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: request.amount,
        });
    }

    let now = Utc::now();
    let card = parse_card(
        &request.card_number,
        &request.card_expiry,
        &request.card_cvv,
        &request.card_holder_name,
        now,
    )?;

    let gateway = ActiveGatewaySelector::require(db).await?;
    let credentials = GatewayCredentials::unlock(&gateway, cipher)?;

    let order_id = ledger::generate_order_id(now);
    let amount = round2(request.amount);

    ledger::open(
        db,
        NewAttempt {
            order_id: order_id.clone(),
            gateway_name: credentials.name.clone(),
            amount,
            currency: request.currency,
            card_holder: Some(card.holder.clone()),
            masked_card: Some(card.masked()),
            form_submission_id: request.form_submission_id,
        },
    )
    .await?;

    let form = protocol.build_request(
        &credentials,
        &PaymentRequest {
            order_id: &order_id,
            amount,
            currency: request.currency,
            card: &card,
            ok_url: &config.callback_url,
            fail_url: &config.callback_url,
            language: &config.language,
            rnd: Uuid::new_v4().simple().to_string(),
        },
    );

    tracing::info!(
        order_id = %order_id,
        gateway = %credentials.name,
        card = %card.masked(),
        "Payment initiated"
    );

    let html_content = form.render_html();
    Ok(InitiatedPayment {
        order_id,
        form,
        html_content,
    })
}

/// What the participant should be told after a callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackResult {
    /// Ledger key of the attempt
    pub order_id: String,
    /// Final status of the attempt
    pub status: TransactionStatus,
}

impl CallbackResult {
    /// Result page URL carrying `status=success|error` and the order id.
    pub fn redirect_url(&self, result_page_url: &str) -> Result<String> {
        let status = if self.status == TransactionStatus::Success {
            "success"
        } else {
            "error"
        };
        let query = serde_urlencoded::to_string([("status", status), ("orderId", self.order_id.as_str())])
            .map_err(|e| Error::validation(format!("Failed to build result URL: {e}")))?;
        let separator = if result_page_url.contains('?') { '&' } else { '?' };
        Ok(format!("{result_page_url}{separator}{query}"))
    }
}

async fn gateway_for_attempt<C>(db: &C, name: &str) -> Result<payment_gateway::Model>
where
    C: ConnectionTrait,
{
    PaymentGateway::find()
        .filter(payment_gateway::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Payment gateway", name))
}

/// Applies a bank callback to the ledger.
///
/// Idempotent by order id: a callback for an attempt that is already terminal changes nothing.
/// A callback that fails authentication marks the attempt `failed` with
/// [`SECURITY_ERROR_CODE`] and is never treated as approved.
pub async fn handle_callback(
    db: &DatabaseConnection,
    cipher: &SecretCipher,
    protocol: &dyn GatewayProtocol,
    fields: &CallbackFields,
) -> Result<CallbackResult> {
    let order_id = fields
        .non_empty("oid")
        .or_else(|| fields.non_empty("ReturnOid"))
        .ok_or_else(|| Error::validation("Callback carries no order id"))?
        .to_string();

    let attempt = ledger::get(db, &order_id).await?;
    if attempt.status.is_terminal() {
        tracing::info!(order_id = %order_id, status = ?attempt.status, "Duplicate callback ignored");
        return Ok(CallbackResult {
            order_id,
            status: attempt.status,
        });
    }

    let gateway = gateway_for_attempt(db, &attempt.gateway_name).await?;
    let credentials = GatewayCredentials::unlock(&gateway, cipher)?;

    let outcome = match protocol.verify_callback(&credentials, fields) {
        Ok(outcome) => outcome,
        Err(e @ Error::Security { .. }) => {
            tracing::error!(order_id = %order_id, error = %e, "Callback failed verification");
            Outcome::Declined {
                error_code: SECURITY_ERROR_CODE.to_string(),
                error_message: "Payment could not be verified".to_string(),
            }
        }
        Err(e) => return Err(e),
    };

    if let Outcome::Declined {
        error_code,
        error_message,
    } = &outcome
    {
        tracing::warn!(order_id = %order_id, error_code = %error_code, error_message = %error_message, "Payment declined");
    }

    let finalized = ledger::finalize(db, &order_id, outcome).await?;
    Ok(CallbackResult {
        order_id,
        status: finalized.transaction.status,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::gateway::ThreeDPayProtocol;
    use crate::test_utils::*;
    use chrono::TimeZone;

    fn june_2026() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4508034508034509"));
        assert!(luhn_valid("79927398713"));
        assert!(!luhn_valid("4508034508034508"));
        assert!(!luhn_valid("45080345080345a9"));
        assert!(!luhn_valid(""));
    }

    #[test]
    fn test_parse_card() {
        let card = parse_card("4508 0345 0803 4509", "06/26", "123", " Ada ", june_2026()).unwrap();
        assert_eq!(card.number, "4508034508034509");
        assert_eq!(card.expiry_month, 6);
        assert_eq!(card.expiry_year, 26);
        assert_eq!(card.holder, "Ada");

        assert!(parse_card("4508034508034509", "05/26", "123", "Ada", june_2026()).is_err());
        assert!(parse_card("4508034508034509", "13/27", "123", "Ada", june_2026()).is_err());
        assert!(parse_card("4508034508034509", "1227", "123", "Ada", june_2026()).is_err());
        assert!(parse_card("4508034508034509", "12/27", "12", "Ada", june_2026()).is_err());
        assert!(parse_card("4508034508034509", "12/27", "12345", "Ada", june_2026()).is_err());
        assert!(parse_card("4508034508034509", "12/27", "123", "  ", june_2026()).is_err());
        assert!(parse_card("4508034508034508", "12/27", "123", "Ada", june_2026()).is_err());
    }

    #[test]
    fn test_redirect_url() {
        let ok = CallbackResult {
            order_id: "ORD1".to_string(),
            status: TransactionStatus::Success,
        };
        assert_eq!(
            ok.redirect_url("https://site.test/result").unwrap(),
            "https://site.test/result?status=success&orderId=ORD1"
        );
        let failed = CallbackResult {
            order_id: "a&b".to_string(),
            status: TransactionStatus::Failed,
        };
        assert_eq!(
            failed.redirect_url("https://site.test/r?lang=tr").unwrap(),
            "https://site.test/r?lang=tr&status=error&orderId=a%26b"
        );
        let spaced = CallbackResult {
            order_id: "ORD 1=x".to_string(),
            status: TransactionStatus::Pending,
        };
        assert_eq!(
            spaced.redirect_url("https://site.test/result").unwrap(),
            "https://site.test/result?status=error&orderId=ORD+1%3Dx"
        );
    }

    #[tokio::test]
    async fn test_initiate_requires_active_gateway() -> Result<()> {
        let db = setup_test_db().await?;
        let result = initiate_payment(
            &db,
            &test_cipher(),
            &ThreeDPayProtocol,
            &PaymentConfig::default(),
            test_initiation(1200.0),
        )
        .await;
        assert!(matches!(result, Err(Error::NoActiveGateway)));
        Ok(())
    }

    #[tokio::test]
    async fn test_initiate_opens_pending_row_with_masked_card() -> Result<()> {
        let (db, cipher) = setup_with_gateway().await?;
        let initiated = initiate_payment(
            &db,
            &cipher,
            &ThreeDPayProtocol,
            &PaymentConfig::default(),
            test_initiation(1200.0),
        )
        .await?;

        let row = ledger::get(&db, &initiated.order_id).await?;
        assert_eq!(row.status, TransactionStatus::Pending);
        assert_eq!(row.masked_card.as_deref(), Some("450803******4509"));
        assert_eq!(row.amount, 1200.0);
        assert!(initiated.html_content.contains(&initiated.order_id));
        assert!(!initiated.html_content.contains("STOREKEY"));
        Ok(())
    }

    #[tokio::test]
    async fn test_initiate_rejects_bad_input_before_writing() -> Result<()> {
        let (db, cipher) = setup_with_gateway().await?;
        let mut request = test_initiation(0.0);
        assert!(matches!(
            initiate_payment(&db, &cipher, &ThreeDPayProtocol, &PaymentConfig::default(), request.clone()).await,
            Err(Error::InvalidAmount { .. })
        ));

        request.amount = 10.0;
        request.card_number = "1234567890123".to_string();
        assert!(matches!(
            initiate_payment(&db, &cipher, &ThreeDPayProtocol, &PaymentConfig::default(), request).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_callback_success_then_retry() -> Result<()> {
        let (db, cipher) = setup_with_gateway().await?;
        let initiated = initiate_payment(
            &db,
            &cipher,
            &ThreeDPayProtocol,
            &PaymentConfig::default(),
            test_initiation(1200.0),
        )
        .await?;

        let fields = signed_callback(TEST_GATEWAY_SECRET, &initiated.order_id, "00", "1");
        let first = handle_callback(&db, &cipher, &ThreeDPayProtocol, &fields).await?;
        assert_eq!(first.status, TransactionStatus::Success);

        let declined = signed_callback(TEST_GATEWAY_SECRET, &initiated.order_id, "05", "1");
        let retry = handle_callback(&db, &cipher, &ThreeDPayProtocol, &declined).await?;
        assert_eq!(retry.status, TransactionStatus::Success);
        Ok(())
    }

    #[tokio::test]
    async fn test_forged_callback_fails_attempt() -> Result<()> {
        let (db, cipher) = setup_with_gateway().await?;
        let initiated = initiate_payment(
            &db,
            &cipher,
            &ThreeDPayProtocol,
            &PaymentConfig::default(),
            test_initiation(1200.0),
        )
        .await?;

        let mut forged = signed_callback(TEST_GATEWAY_SECRET, &initiated.order_id, "00", "1");
        forged.insert("AuthCode", "FAKE");
        let result = handle_callback(&db, &cipher, &ThreeDPayProtocol, &forged).await?;
        assert_eq!(result.status, TransactionStatus::Failed);

        let row = ledger::get(&db, &initiated.order_id).await?;
        assert_eq!(row.error_code.as_deref(), Some(SECURITY_ERROR_CODE));

        // a genuine callback afterwards cannot revive it
        let genuine = signed_callback(TEST_GATEWAY_SECRET, &initiated.order_id, "00", "1");
        let after = handle_callback(&db, &cipher, &ThreeDPayProtocol, &genuine).await?;
        assert_eq!(after.status, TransactionStatus::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_callback_without_order_id() -> Result<()> {
        let (db, cipher) = setup_with_gateway().await?;
        let fields = CallbackFields::default();
        assert!(matches!(
            handle_callback(&db, &cipher, &ThreeDPayProtocol, &fields).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }
}
