//! Types for the Horizon-style chain query API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paging cursor sentinel that starts a stream at the live tail, skipping history.
pub const CURSOR_NOW: &str = "now";

/// Streaming endpoints exposed by the query API.
///
/// Used both to open a record stream and to probe-validate a cursor against
/// the same endpoint the subscription will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEndpoint {
    Ledgers,
    Transactions,
    Trades,
}

impl StreamEndpoint {
    /// URL path segment for this endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            StreamEndpoint::Ledgers => "ledgers",
            StreamEndpoint::Transactions => "transactions",
            StreamEndpoint::Trades => "trades",
        }
    }
}

/// A settled ledger (block) header.
///
/// Immutable once produced; `sequence` is strictly increasing and gap-free
/// upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub sequence: u64,
    pub hash: String,
    /// Hash of the parent ledger. Absent only for the genesis ledger.
    #[serde(default)]
    pub prev_hash: Option<String>,
    pub closed_at: DateTime<Utc>,
    /// Number of transactions applied in this ledger.
    #[serde(rename = "successful_transaction_count", alias = "transaction_count")]
    pub transaction_count: u32,
    /// Aggregate fee pool, as a string-encoded decimal.
    #[serde(default)]
    pub fee_pool: String,
    pub paging_token: String,
}

/// A transaction as returned by the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    /// Sequence of the ledger this transaction belongs to.
    pub ledger: u64,
    pub source_account: String,
    /// Fee paid, in stroops, as a string-encoded integer.
    #[serde(default)]
    pub fee_charged: String,
    pub operation_count: u32,
    pub created_at: DateTime<Utc>,
    pub paging_token: String,
}

/// One atomic operation within a transaction.
///
/// The common envelope fields are shared by every variant; the `detail`
/// payload is the variant-specific field set, dispatched on the upstream
/// `type` discriminator. Unrecognized types deserialize into
/// `OperationDetail::Unknown` instead of failing the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    pub paging_token: String,
    pub transaction_hash: String,
    #[serde(default)]
    pub source_account: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: OperationDetail,
}

/// Variant-specific operation payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OperationDetail {
    #[serde(rename = "create_account")]
    CreateAccount {
        #[serde(default)]
        funder: Option<String>,
        #[serde(default)]
        account: Option<String>,
        starting_balance: String,
    },
    #[serde(rename = "payment")]
    Payment {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
        amount: String,
        asset_type: String,
        #[serde(default)]
        asset_code: Option<String>,
        #[serde(default)]
        asset_issuer: Option<String>,
    },
    #[serde(rename = "path_payment_strict_receive", alias = "path_payment")]
    PathPaymentStrictReceive {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
        amount: String,
        #[serde(default)]
        source_amount: String,
        #[serde(default)]
        source_max: String,
        asset_type: String,
        #[serde(default)]
        asset_code: Option<String>,
        #[serde(default)]
        asset_issuer: Option<String>,
        #[serde(default)]
        source_asset_type: Option<String>,
        #[serde(default)]
        source_asset_code: Option<String>,
        #[serde(default)]
        source_asset_issuer: Option<String>,
    },
    #[serde(rename = "path_payment_strict_send")]
    PathPaymentStrictSend {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
        amount: String,
        #[serde(default)]
        source_amount: String,
        #[serde(default)]
        destination_min: String,
        asset_type: String,
        #[serde(default)]
        asset_code: Option<String>,
        #[serde(default)]
        asset_issuer: Option<String>,
        #[serde(default)]
        source_asset_type: Option<String>,
        #[serde(default)]
        source_asset_code: Option<String>,
        #[serde(default)]
        source_asset_issuer: Option<String>,
    },
    #[serde(rename = "manage_sell_offer", alias = "manage_offer")]
    ManageSellOffer {
        amount: String,
        price: String,
        #[serde(default)]
        offer_id: String,
        buying_asset_type: String,
        #[serde(default)]
        buying_asset_code: Option<String>,
        #[serde(default)]
        buying_asset_issuer: Option<String>,
        selling_asset_type: String,
        #[serde(default)]
        selling_asset_code: Option<String>,
        #[serde(default)]
        selling_asset_issuer: Option<String>,
    },
    #[serde(rename = "manage_buy_offer")]
    ManageBuyOffer {
        amount: String,
        price: String,
        #[serde(default)]
        offer_id: String,
        buying_asset_type: String,
        #[serde(default)]
        buying_asset_code: Option<String>,
        #[serde(default)]
        buying_asset_issuer: Option<String>,
        selling_asset_type: String,
        #[serde(default)]
        selling_asset_code: Option<String>,
        #[serde(default)]
        selling_asset_issuer: Option<String>,
    },
    #[serde(rename = "create_passive_sell_offer", alias = "create_passive_offer")]
    CreatePassiveSellOffer {
        amount: String,
        price: String,
        buying_asset_type: String,
        #[serde(default)]
        buying_asset_code: Option<String>,
        #[serde(default)]
        buying_asset_issuer: Option<String>,
        selling_asset_type: String,
        #[serde(default)]
        selling_asset_code: Option<String>,
        #[serde(default)]
        selling_asset_issuer: Option<String>,
    },
    #[serde(rename = "set_options")]
    SetOptions {
        #[serde(default)]
        inflation_dest: Option<String>,
        #[serde(default)]
        home_domain: Option<String>,
        #[serde(default)]
        signer_key: Option<String>,
        #[serde(default)]
        signer_weight: Option<u32>,
        #[serde(default)]
        master_key_weight: Option<u32>,
        #[serde(default)]
        low_threshold: Option<u32>,
        #[serde(default)]
        med_threshold: Option<u32>,
        #[serde(default)]
        high_threshold: Option<u32>,
        #[serde(default)]
        set_flags_s: Vec<String>,
        #[serde(default)]
        clear_flags_s: Vec<String>,
    },
    #[serde(rename = "change_trust")]
    ChangeTrust {
        #[serde(default)]
        trustor: Option<String>,
        #[serde(default)]
        trustee: Option<String>,
        asset_type: String,
        #[serde(default)]
        asset_code: Option<String>,
        #[serde(default)]
        asset_issuer: Option<String>,
        #[serde(default)]
        limit: String,
    },
    #[serde(rename = "allow_trust")]
    AllowTrust {
        #[serde(default)]
        trustor: Option<String>,
        #[serde(default)]
        trustee: Option<String>,
        asset_type: String,
        #[serde(default)]
        asset_code: Option<String>,
        #[serde(default)]
        asset_issuer: Option<String>,
        authorize: bool,
    },
    #[serde(rename = "account_merge")]
    AccountMerge {
        #[serde(default)]
        account: Option<String>,
        #[serde(default)]
        into: Option<String>,
    },
    #[serde(rename = "inflation")]
    Inflation {},
    #[serde(rename = "manage_data")]
    ManageData {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    #[serde(rename = "bump_sequence")]
    BumpSequence {
        bump_to: String,
    },
    /// Catch-all for operation types this version does not recognize.
    #[serde(other)]
    Unknown,
}

/// An asset referenced by an operation.
///
/// Identity is (type, code, issuer); the derived `Eq`/`Hash` carry the
/// deduplication contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Native,
    CreditAlphanum4 { code: String, issuer: String },
    CreditAlphanum12 { code: String, issuer: String },
    Unknown,
}

impl Asset {
    /// Build an asset from the upstream (type, code, issuer) field triple.
    pub fn from_parts(asset_type: &str, code: Option<&str>, issuer: Option<&str>) -> Self {
        match (asset_type, code, issuer) {
            ("native", _, _) => Asset::Native,
            ("credit_alphanum4", Some(code), Some(issuer)) => Asset::CreditAlphanum4 {
                code: code.to_string(),
                issuer: issuer.to_string(),
            },
            ("credit_alphanum12", Some(code), Some(issuer)) => Asset::CreditAlphanum12 {
                code: code.to_string(),
                issuer: issuer.to_string(),
            },
            _ => Asset::Unknown,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Upstream asset-type discriminator string.
    pub fn type_code(&self) -> &'static str {
        match self {
            Asset::Native => "native",
            Asset::CreditAlphanum4 { .. } => "credit_alphanum4",
            Asset::CreditAlphanum12 { .. } => "credit_alphanum12",
            Asset::Unknown => "unknown",
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Asset::CreditAlphanum4 { code, .. } | Asset::CreditAlphanum12 { code, .. } => {
                Some(code)
            }
            _ => None,
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        match self {
            Asset::CreditAlphanum4 { issuer, .. } | Asset::CreditAlphanum12 { issuer, .. } => {
                Some(issuer)
            }
            _ => None,
        }
    }
}

/// One effect produced by an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectRecord {
    #[serde(rename = "type")]
    pub effect_type: String,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub asset_type: Option<String>,
}

/// A trade between two offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub paging_token: String,
    pub ledger_close_time: DateTime<Utc>,
    #[serde(default)]
    pub base_account: Option<String>,
    #[serde(default)]
    pub counter_account: Option<String>,
    pub base_amount: String,
    pub counter_amount: String,
    pub base_asset_type: String,
    #[serde(default)]
    pub base_asset_code: Option<String>,
    #[serde(default)]
    pub base_asset_issuer: Option<String>,
    pub counter_asset_type: String,
    #[serde(default)]
    pub counter_asset_code: Option<String>,
    #[serde(default)]
    pub counter_asset_issuer: Option<String>,
}

/// One balance line of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceLine {
    pub balance: String,
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
}

/// Full account details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    pub sequence: String,
    #[serde(default)]
    pub subentry_count: u32,
    #[serde(default)]
    pub home_domain: Option<String>,
    #[serde(default)]
    pub balances: Vec<BalanceLine>,
}

/// Authorization flags of an issued asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetFlags {
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub auth_revocable: bool,
}

/// Chain-side statistics of an issued asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
    /// Circulating amount; may be absent or non-numeric upstream.
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub num_accounts: u64,
    #[serde(default)]
    pub flags: AssetFlags,
}

/// Error types for chain query operations
#[derive(Debug, thiserror::Error)]
pub enum HorizonError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad cursor: {0}")]
    BadCursor(String),
}
