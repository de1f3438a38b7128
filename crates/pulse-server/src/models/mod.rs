//! Activity record model
//!
//! One [`ActivityRecord`] per merchant event. The enumerated columns are stored
//! as upper-case text in the `activities` table, so every enum here round-trips
//! through [`as_str`](Product::as_str) and `FromStr`.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a closed set of upper-case text values.
///
/// Parsing trims and ignores case so `" pos "` and `"POS"` are the same member.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| UnknownVariant {
                        kind: stringify!($name),
                        value: wanted.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// A value that is not a member of the expected enumeration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

text_enum! {
    /// Product line an event belongs to
    Product {
        Pos => "POS",
        Airtime => "AIRTIME",
        Bills => "BILLS",
        CardPayment => "CARD_PAYMENT",
        Savings => "SAVINGS",
        Moniebook => "MONIEBOOK",
        Kyc => "KYC",
    }
}

text_enum! {
    /// Outcome of an event
    Status {
        Success => "SUCCESS",
        Failed => "FAILED",
        Pending => "PENDING",
    }
}

text_enum! {
    Channel {
        Pos => "POS",
        App => "APP",
        Ussd => "USSD",
        Web => "WEB",
        Offline => "OFFLINE",
    }
}

text_enum! {
    MerchantTier {
        Starter => "STARTER",
        Verified => "VERIFIED",
        Premium => "PREMIUM",
    }
}

/// A validated, normalized merchant event ready for persistence
///
/// Immutable once written: the store never updates or deletes rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub event_id: Uuid,
    pub merchant_id: String,
    pub event_timestamp: Option<DateTime<Utc>>,
    pub product: Product,
    pub event_type: String,
    /// Always `>= 0` with two decimal places
    pub amount: Decimal,
    pub status: Status,
    pub channel: Option<Channel>,
    pub region: Option<String>,
    pub merchant_tier: Option<MerchantTier>,
}

/// Round a money value to cents, halves away from zero (as PostgreSQL `NUMERIC` does)
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cents_rounds_halves_up() {
        assert_eq!(round_cents("0.125".parse().unwrap()).to_string(), "0.13");
        assert_eq!(round_cents("10.005".parse().unwrap()).to_string(), "10.01");
        assert_eq!(round_cents("2.675".parse().unwrap()).to_string(), "2.68");
    }

    #[test]
    fn test_product_parse_is_case_insensitive() {
        assert_eq!("pos".parse::<Product>().unwrap(), Product::Pos);
        assert_eq!(" Card_Payment ".parse::<Product>().unwrap(), Product::CardPayment);
        assert_eq!("KYC".parse::<Product>().unwrap(), Product::Kyc);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "CANCELLED".parse::<Status>().unwrap_err();
        assert_eq!(err.kind, "Status");
        assert_eq!(err.value, "CANCELLED");
    }

    #[test]
    fn test_as_str_round_trip() {
        for tier in MerchantTier::ALL {
            assert_eq!(tier.as_str().parse::<MerchantTier>().unwrap(), *tier);
        }
        assert_eq!(Channel::Ussd.to_string(), "USSD");
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Product::CardPayment).unwrap();
        assert_eq!(json, "\"CARD_PAYMENT\"");
    }
}
