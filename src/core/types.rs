use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const MINOR_PER_UNIT: u64 = 100;
const CURRENCY_GLYPH: char = '₪';

/// Currency amount held in minor units (agorot) so comparisons stay exact.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_units(units: u64) -> Self {
        Money(units.saturating_mul(MINOR_PER_UNIT))
    }

    pub const fn from_minor(minor: u64) -> Self {
        Money(minor)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub const fn whole_units(self) -> u64 {
        self.0 / MINOR_PER_UNIT
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Applies a rate in basis points and rounds half-up to a whole currency unit.
    pub fn basis_points_rounded(self, bps: u32) -> Money {
        let scaled = u128::from(self.0) * u128::from(bps);
        let divisor = u128::from(MINOR_PER_UNIT) * 10_000;
        let units = (scaled + divisor / 2) / divisor;
        Money::from_units(u64::try_from(units).unwrap_or(u64::MAX / MINOR_PER_UNIT))
    }

    /// Lenient parse of user-entered or URL-carried amounts.
    ///
    /// Strips the currency glyph, thousands separators and whitespace. Anything that is not a
    /// non-negative decimal number yields `None`. Digits beyond the second fractional place are
    /// dropped.
    pub fn parse(raw: &str) -> Option<Money> {
        let cleaned: String = raw
            .chars()
            .filter(|c| *c != CURRENCY_GLYPH && *c != ',' && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return None;
        }

        let (whole, fraction) = match cleaned.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (cleaned.as_str(), ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u64>().ok()?
        };
        let mut fraction_minor = 0u64;
        for (idx, digit) in fraction.chars().take(2).enumerate() {
            let value = u64::from(digit.to_digit(10)?);
            fraction_minor += if idx == 0 { value * 10 } else { value };
        }

        whole_units
            .checked_mul(MINOR_PER_UNIT)?
            .checked_add(fraction_minor)
            .map(Money)
    }

    /// Canonical machine form: `"11625"` or `"11625.50"`.
    pub fn to_plain_string(self) -> String {
        let fraction = self.0 % MINOR_PER_UNIT;
        if fraction == 0 {
            self.whole_units().to_string()
        } else {
            format!("{}.{fraction:02}", self.whole_units())
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.whole_units().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (idx, ch) in digits.chars().enumerate() {
            if idx > 0 && (digits.len() - idx) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        let fraction = self.0 % MINOR_PER_UNIT;
        if fraction == 0 {
            write!(f, "{CURRENCY_GLYPH}{grouped}")
        } else {
            write!(f, "{CURRENCY_GLYPH}{grouped}.{fraction:02}")
        }
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % MINOR_PER_UNIT == 0 {
            serializer.serialize_u64(self.whole_units())
        } else {
            serializer.serialize_str(&self.to_plain_string())
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Units(u64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Units(units) => units
                .checked_mul(MINOR_PER_UNIT)
                .map(Money)
                .ok_or_else(|| serde::de::Error::custom("amount out of range")),
            Wire::Text(text) => Money::parse(&text)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid amount {text:?}"))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomeBracket {
    Low,
    Medium,
    High,
}

/// Regulator caps and display labels attached to one income bracket.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BracketLimits {
    pub income_label: &'static str,
    pub max_per_offer: Money,
    /// `None` for the top bracket, whose cross-offer cap collapses to `max_per_offer`.
    pub max_across_offers: Option<Money>,
    pub per_offer_qualifier: Option<&'static str>,
}

impl BracketLimits {
    pub fn cross_offer_cap(&self) -> Money {
        self.max_across_offers.unwrap_or(self.max_per_offer)
    }
}

const LOW_LIMITS: BracketLimits = BracketLimits {
    income_label: "Up to ₪406,925",
    max_per_offer: Money::from_units(11_625),
    max_across_offers: Some(Money::from_units(23_250)),
    per_offer_qualifier: None,
};

const MEDIUM_LIMITS: BracketLimits = BracketLimits {
    income_label: "₪406,926 – ₪871,990",
    max_per_offer: Money::from_units(34_875),
    max_across_offers: Some(Money::from_units(34_875)),
    per_offer_qualifier: None,
};

// The 5% rule is displayed only; nothing computes it.
const HIGH_LIMITS: BracketLimits = BracketLimits {
    income_label: "₪871,991 – ₪1,395,175",
    max_per_offer: Money::from_units(116_260),
    max_across_offers: None,
    per_offer_qualifier: Some("or 5% of annual income (whichever is lower)"),
};

impl IncomeBracket {
    pub const ALL: [IncomeBracket; 3] = [
        IncomeBracket::Low,
        IncomeBracket::Medium,
        IncomeBracket::High,
    ];

    pub const fn limits(self) -> &'static BracketLimits {
        match self {
            IncomeBracket::Low => &LOW_LIMITS,
            IncomeBracket::Medium => &MEDIUM_LIMITS,
            IncomeBracket::High => &HIGH_LIMITS,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            IncomeBracket::Low => "low",
            IncomeBracket::Medium => "medium",
            IncomeBracket::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<IncomeBracket> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|bracket| bracket.as_str().eq_ignore_ascii_case(trimmed))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolatedRule {
    PerOffer,
    CrossOffer,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityVerdict {
    pub valid: bool,
    pub reason: Option<String>,
    pub violated_rule: Option<ViolatedRule>,
}

impl EligibilityVerdict {
    pub fn allowed() -> Self {
        Self {
            valid: true,
            reason: None,
            violated_rule: None,
        }
    }

    pub fn rejected(rule: ViolatedRule, reason: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            violated_rule: Some(rule),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    CreditCard,
    BankTransfer,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit-card",
            PaymentMethod::BankTransfer => "bank-transfer",
        }
    }

    pub fn parse(raw: &str) -> Option<PaymentMethod> {
        match raw.trim() {
            "credit-card" => Some(PaymentMethod::CreditCard),
            "bank-transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }
}

/// Tunable funnel thresholds. Defaults match the regulated offer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FunnelRules {
    pub minimum_investment: Money,
    pub income_modal_threshold: Money,
    pub prior_invested: Money,
    pub payment_fee_bps: u32,
}

pub const DEFAULT_MINIMUM_INVESTMENT: Money = Money::from_units(1_000);
pub const DEFAULT_INCOME_MODAL_THRESHOLD: Money = Money::from_units(8_000);
pub const DEFAULT_PRIOR_INVESTED: Money = Money::from_units(15_000);
pub const DEFAULT_PAYMENT_FEE_BPS: u32 = 300;

pub const PRESET_AMOUNTS: [Money; 4] = [
    Money::from_units(6_000),
    Money::from_units(12_000),
    Money::from_units(30_000),
    Money::from_units(100_000),
];
pub const DEFAULT_ENTRY_AMOUNT: Money = PRESET_AMOUNTS[0];

impl Default for FunnelRules {
    fn default() -> Self {
        Self {
            minimum_investment: DEFAULT_MINIMUM_INVESTMENT,
            income_modal_threshold: DEFAULT_INCOME_MODAL_THRESHOLD,
            prior_invested: DEFAULT_PRIOR_INVESTED,
            payment_fee_bps: DEFAULT_PAYMENT_FEE_BPS,
        }
    }
}

impl FunnelRules {
    pub fn meets_minimum(&self, amount: Money) -> bool {
        amount >= self.minimum_investment
    }

    pub fn requires_declaration(&self, amount: Money) -> bool {
        amount > self.income_modal_threshold
    }

    pub fn fee_for(&self, amount: Money) -> Money {
        amount.basis_points_rounded(self.payment_fee_bps)
    }
}
