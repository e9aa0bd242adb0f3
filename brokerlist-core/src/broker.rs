//! Broker records.
//!
//! The broker store hands out loosely-typed rows ([`RawBroker`]); every field
//! is optional and the JSON columns may be malformed. [`BrokerSnapshot`] is
//! the fully-populated value the scorers consume. All defaulting happens once,
//! in [`BrokerSnapshot::from_raw`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BrokerId;

/// Review proxy used when a broker has neither a trust score nor a rating.
pub const DEFAULT_REVIEW_PROXY: f64 = 6.0;

// ============================================================================
// RAW ROW
// ============================================================================

/// Broker row as returned by the broker store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBroker {
    pub id: BrokerId,
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub regulation_status: Option<String>,
    pub broker_type: Option<String>,
    pub overall_rating: Option<f64>,
    pub trust_score: Option<f64>,
    pub minimum_deposit: Option<f64>,
    /// JSON object, or a string containing a JSON object.
    pub fees: Option<Value>,
    /// JSON object, or a string containing a JSON object.
    pub platform_features: Option<Value>,
    pub mobile_trading: Option<bool>,
    pub demo_account: Option<bool>,
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Execution model flags parsed from the broker type label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionModel {
    pub ecn: bool,
    pub stp: bool,
    pub dma: bool,
    pub market_maker: bool,
}

impl ExecutionModel {
    /// Parse a free-form label such as `"ECN/STP"` or `"Market Maker"`.
    pub fn parse(label: &str) -> Self {
        let normalized: String = label
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        Self {
            ecn: normalized.contains("ecn"),
            stp: normalized.contains("stp"),
            dma: normalized.contains("dma"),
            market_maker: normalized.contains("market maker"),
        }
    }
}

/// Spread pricing model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadType {
    Fixed,
    Variable,
    Raw,
    #[default]
    Unknown,
}

impl SpreadType {
    fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "fixed" => SpreadType::Fixed,
            "variable" => SpreadType::Variable,
            "raw" => SpreadType::Raw,
            _ => SpreadType::Unknown,
        }
    }

    /// Variable and raw spreads count as competitive pricing.
    pub fn is_competitive(&self) -> bool {
        matches!(self, SpreadType::Variable | SpreadType::Raw)
    }
}

/// Fee structure parsed from the `fees` JSON column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeStructure {
    pub spread_type: SpreadType,
    pub withdrawal_fee: bool,
    pub inactivity_fee: bool,
}

impl FeeStructure {
    fn from_json(value: &Value) -> Self {
        let trading = value.get("trading");
        let non_trading = value.get("nonTrading");
        Self {
            spread_type: trading
                .and_then(|t| t.get("spreadType"))
                .and_then(Value::as_str)
                .map(SpreadType::parse)
                .unwrap_or_default(),
            withdrawal_fee: charges_fee(non_trading.and_then(|n| n.get("withdrawalFee")), "free"),
            inactivity_fee: charges_fee(non_trading.and_then(|n| n.get("inactivityFee")), "none"),
        }
    }
}

/// Trading platforms and feature flags parsed from `platform_features`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFeatures {
    /// Platform names, lower-cased.
    pub platforms: Vec<String>,
    pub api_access: bool,
    pub ea_support: bool,
    pub copy_trading: bool,
    pub backtesting: bool,
    pub islamic_accounts: bool,
    pub mobile_trading: bool,
    pub demo_account: bool,
}

impl PlatformFeatures {
    fn from_json(value: &Value) -> Self {
        let platforms = value
            .get("platforms")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|p| p.trim().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            platforms,
            api_access: truthy(value.get("apiAccess")),
            ea_support: truthy(value.get("eaSupport")),
            copy_trading: value
                .get("copyTrading")
                .map(|c| truthy(c.get("available")))
                .unwrap_or(false),
            backtesting: truthy(value.get("backtesting")),
            islamic_accounts: truthy(value.get("islamicAccounts")),
            mobile_trading: false,
            demo_account: false,
        }
    }

    /// Case-insensitive platform membership check.
    pub fn supports(&self, platform: &str) -> bool {
        let wanted = platform.to_lowercase();
        self.platforms.iter().any(|p| *p == wanted)
    }
}

/// Immutable, fully-populated view of one broker at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub id: BrokerId,
    pub name: String,
    pub active: bool,
    /// Regulator tokens, lower-cased (e.g. `["fca", "cysec"]`).
    pub regulators: Vec<String>,
    pub execution: ExecutionModel,
    /// Overall rating on a 0-10 scale, 0.0 when unknown.
    pub overall_rating: f64,
    /// Trust score, else overall rating, else [`DEFAULT_REVIEW_PROXY`].
    pub review_proxy: f64,
    /// Minimum deposit in account currency; `None` when the broker does not publish one.
    pub minimum_deposit: Option<f64>,
    pub fees: FeeStructure,
    pub platform: PlatformFeatures,
}

impl BrokerSnapshot {
    /// A neutral snapshot: no regulators, no rating, no platforms.
    pub fn new(id: BrokerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            regulators: Vec::new(),
            execution: ExecutionModel::default(),
            overall_rating: 0.0,
            review_proxy: DEFAULT_REVIEW_PROXY,
            minimum_deposit: None,
            fees: FeeStructure::default(),
            platform: PlatformFeatures::default(),
        }
    }

    /// Build a snapshot from a store row, defaulting every field once.
    pub fn from_raw(raw: &RawBroker) -> Self {
        let overall_rating = finite(raw.overall_rating).unwrap_or(0.0);
        let review_proxy = finite(raw.trust_score)
            .filter(|t| *t > 0.0)
            .or_else(|| finite(raw.overall_rating).filter(|r| *r > 0.0))
            .unwrap_or(DEFAULT_REVIEW_PROXY);

        let mut platform = raw
            .platform_features
            .as_ref()
            .and_then(json_object)
            .map(|v| PlatformFeatures::from_json(&v))
            .unwrap_or_default();
        platform.mobile_trading = raw.mobile_trading.unwrap_or(false);
        platform.demo_account = raw.demo_account.unwrap_or(false);

        Self {
            id: raw.id,
            name: raw.name.clone().unwrap_or_else(|| format!("broker-{}", raw.id)),
            active: raw.is_active.unwrap_or(true),
            regulators: raw
                .regulation_status
                .as_deref()
                .map(tokenize_regulators)
                .unwrap_or_default(),
            execution: raw
                .broker_type
                .as_deref()
                .map(ExecutionModel::parse)
                .unwrap_or_default(),
            overall_rating,
            review_proxy,
            minimum_deposit: finite(raw.minimum_deposit),
            fees: raw
                .fees
                .as_ref()
                .and_then(json_object)
                .map(|v| FeeStructure::from_json(&v))
                .unwrap_or_default(),
            platform,
        }
    }

    pub fn with_regulators(mut self, regulation_status: &str) -> Self {
        self.regulators = tokenize_regulators(regulation_status);
        self
    }

    pub fn with_execution(mut self, broker_type: &str) -> Self {
        self.execution = ExecutionModel::parse(broker_type);
        self
    }

    pub fn with_rating(mut self, overall_rating: f64) -> Self {
        self.overall_rating = overall_rating;
        self
    }

    pub fn with_review_proxy(mut self, review_proxy: f64) -> Self {
        self.review_proxy = review_proxy;
        self
    }

    pub fn with_minimum_deposit(mut self, deposit: f64) -> Self {
        self.minimum_deposit = Some(deposit);
        self
    }

    pub fn with_fees(mut self, fees: FeeStructure) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_platform(mut self, platform: PlatformFeatures) -> Self {
        self.platform = platform;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether the broker is regulated by `regulator` (lower-case token).
    pub fn has_regulator(&self, regulator: &str) -> bool {
        self.regulators.iter().any(|r| r == regulator)
    }
}

// ============================================================================
// COUNTRY AVAILABILITY
// ============================================================================

/// Confidence attached to a per-country availability record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityConfidence {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

/// Whether a broker accepts clients from a given country.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryAvailability {
    /// `None` when the store has a row but availability was never verified.
    pub available: Option<bool>,
    #[serde(default)]
    pub confidence: AvailabilityConfidence,
}

impl CountryAvailability {
    pub fn available(confidence: AvailabilityConfidence) -> Self {
        Self {
            available: Some(true),
            confidence,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: Some(false),
            confidence: AvailabilityConfidence::High,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Split a regulation label like `"FCA, CySEC (Cyprus)"` into lower-case tokens.
fn tokenize_regulators(regulation_status: &str) -> Vec<String> {
    let mut tokens: Vec<String> = regulation_status
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Accept either a JSON object or a string holding a JSON object.
fn json_object(value: &Value) -> Option<Value> {
    match value {
        Value::Object(_) => Some(value.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(Value::is_object),
        _ => None,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// A fee column counts as charging when present, truthy and not the "free" word.
fn charges_fee(value: Option<&Value>, free_word: &str) -> bool {
    match value {
        Some(Value::String(s)) => !s.is_empty() && !s.eq_ignore_ascii_case(free_word),
        other => truthy(other),
    }
}
