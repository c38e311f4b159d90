use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::BookingSettings;
use crate::entities::order::{self, PaymentMethod};

/// What the client needs to render a payment screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "payment_type", rename_all = "snake_case")]
pub enum PaymentInstructions {
    VirtualAccount {
        bank: String,
        va_number: String,
        expiry_time: DateTime<Utc>,
        instruction: Vec<String>,
    },
    Qris {
        qr_string: String,
        expiry_time: DateTime<Utc>,
        instruction: Vec<String>,
    },
}

impl PaymentInstructions {
    pub fn expiry_time(&self) -> DateTime<Utc> {
        match self {
            PaymentInstructions::VirtualAccount { expiry_time, .. }
            | PaymentInstructions::Qris { expiry_time, .. } => *expiry_time,
        }
    }
}

/// Institution prefix followed by the payer's phone, minus one leading zero
pub fn virtual_account_number(settings: &BookingSettings, payer_phone: Option<&str>) -> String {
    let phone = payer_phone
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(&settings.va_default_phone);
    let phone = phone.strip_prefix('0').unwrap_or(phone);
    format!("{}{}", settings.va_institution_prefix, phone)
}

pub fn synthesize(
    method: PaymentMethod,
    order: &order::Model,
    payer_phone: Option<&str>,
    settings: &BookingSettings,
) -> PaymentInstructions {
    match method {
        PaymentMethod::BcaVa => {
            let va_number = virtual_account_number(settings, payer_phone);
            PaymentInstructions::VirtualAccount {
                bank: settings.va_bank_name.clone(),
                expiry_time: order.created_at + Duration::hours(settings.va_expiry_hours),
                instruction: vec![
                    format!("1. Open m-{0} or go to a {0} ATM.", settings.va_bank_name),
                    format!(
                        "2. Choose m-Transfer > {} Virtual Account.",
                        settings.va_bank_name
                    ),
                    format!("3. Enter the virtual account number: {}", va_number),
                    "4. Check the TiketLoka bill details.".to_string(),
                    "5. Enter your PIN and keep the transfer receipt.".to_string(),
                ],
                va_number,
            }
        }
        PaymentMethod::Qris => PaymentInstructions::Qris {
            qr_string: format!("{}{}", settings.qris_payload_prefix, order.reference_code),
            expiry_time: order.created_at + Duration::minutes(settings.qris_expiry_minutes),
            instruction: vec![
                "1. Open an e-wallet app (GoPay, OVO, Dana) or your mobile banking app.".to_string(),
                "2. Choose Scan QRIS.".to_string(),
                "3. Point the camera at the QR code above.".to_string(),
                "4. Check the payment amount.".to_string(),
                "5. Enter your PIN to complete the payment.".to_string(),
            ],
        },
    }
}
