//! Operation-to-FunctionCall mapping.
//!
//! One pure mapping function per operation variant, dispatched by an
//! exhaustive match over the variant enum. Unrecognized variants map to a
//! sentinel call tagged `unknown` with empty arguments, so one unsupported
//! record never blocks a batch. After variant-specific mapping the dispatcher
//! uniformly stamps the envelope: ledger, transaction hash, timestamp, depth,
//! index, effect names, and the deterministic content hash.

use std::collections::BTreeMap;

use itertools::Itertools;
use tracing::warn;

use crate::horizon::{Asset, EffectRecord, OperationDetail, OperationRecord};
use crate::mapper::enrich::EntityEnricher;
use crate::mapper::function_call::{content_hash, FunctionArgument, FunctionCall};
use crate::utils::{format_amount, parse_amount};

const ZERO: &str = "0";

/// Metadata key recording a soft data-integrity failure.
pub const METADATA_DATA_INTEGRITY: &str = "dataIntegrity";

/// Variant-specific mapping output, before the uniform envelope stamp.
struct MappedCall {
    from: String,
    to: String,
    operation_type: &'static str,
    asset: Option<Asset>,
    value: String,
    lumens_transferred: String,
    metadata: BTreeMap<String, String>,
    arguments: Vec<FunctionArgument>,
    signature: &'static str,
}

impl Default for MappedCall {
    fn default() -> Self {
        Self {
            from: String::new(),
            to: String::new(),
            operation_type: "unknown",
            asset: None,
            value: ZERO.to_string(),
            lumens_transferred: ZERO.to_string(),
            metadata: BTreeMap::new(),
            arguments: Vec::new(),
            signature: "",
        }
    }
}

/// Map one raw operation into the canonical FunctionCall.
///
/// Never fails: enrichment failures degrade to empty effect lists and
/// unrecognized variants produce the sentinel call.
pub async fn map_operation(
    op: &OperationRecord,
    ledger_seq: u64,
    index: u32,
    enricher: &EntityEnricher,
) -> FunctionCall {
    let effects = enricher.effects_for_operation(&op.id).await;
    let mapped = map_detail(op, &effects);
    let effect_names = effects.iter().map(|e| e.effect_type.as_str()).join(",");

    FunctionCall {
        from: mapped.from,
        to: mapped.to,
        operation_type: mapped.operation_type.to_string(),
        asset_type: mapped.asset.as_ref().map(asset_label),
        value: mapped.value,
        lumens_transferred: mapped.lumens_transferred,
        metadata: mapped.metadata,
        arguments: mapped.arguments,
        signature: mapped.signature.to_string(),
        ledger: ledger_seq,
        transaction_hash: op.transaction_hash.clone(),
        timestamp: op.created_at,
        depth: 0,
        index,
        effects: effect_names,
        hash: content_hash(ledger_seq, &op.transaction_hash, index),
    }
}

fn map_detail(op: &OperationRecord, effects: &[EffectRecord]) -> MappedCall {
    match &op.detail {
        OperationDetail::CreateAccount {
            funder,
            account,
            starting_balance,
        } => map_create_account(op, funder, account, starting_balance),
        OperationDetail::Payment {
            from,
            to,
            amount,
            asset_type,
            asset_code,
            asset_issuer,
        } => map_payment(from, to, amount, asset_parts(asset_type, asset_code, asset_issuer)),
        OperationDetail::PathPaymentStrictReceive {
            from,
            to,
            amount,
            source_amount,
            source_max,
            asset_type,
            asset_code,
            asset_issuer,
            source_asset_type,
            source_asset_code,
            source_asset_issuer,
        } => map_path_payment(
            "path_payment_strict_receive",
            "path_payment_strict_receive(asset,amount,address,asset,amount)",
            from,
            to,
            amount,
            source_amount,
            ("source_max", source_max.as_str()),
            asset_parts(asset_type, asset_code, asset_issuer),
            opt_asset_parts(source_asset_type, source_asset_code, source_asset_issuer),
        ),
        OperationDetail::PathPaymentStrictSend {
            from,
            to,
            amount,
            source_amount,
            destination_min,
            asset_type,
            asset_code,
            asset_issuer,
            source_asset_type,
            source_asset_code,
            source_asset_issuer,
        } => map_path_payment(
            "path_payment_strict_send",
            "path_payment_strict_send(asset,amount,address,asset,amount)",
            from,
            to,
            amount,
            source_amount,
            ("destination_min", destination_min.as_str()),
            asset_parts(asset_type, asset_code, asset_issuer),
            opt_asset_parts(source_asset_type, source_asset_code, source_asset_issuer),
        ),
        OperationDetail::ManageSellOffer {
            amount,
            price,
            offer_id,
            buying_asset_type,
            buying_asset_code,
            buying_asset_issuer,
            selling_asset_type,
            selling_asset_code,
            selling_asset_issuer,
        } => map_offer(
            op,
            "manage_sell_offer",
            "manage_sell_offer(asset,asset,amount,price)",
            amount,
            price,
            Some(offer_id.as_str()),
            false,
            asset_parts(selling_asset_type, selling_asset_code, selling_asset_issuer),
            asset_parts(buying_asset_type, buying_asset_code, buying_asset_issuer),
        ),
        OperationDetail::ManageBuyOffer {
            amount,
            price,
            offer_id,
            buying_asset_type,
            buying_asset_code,
            buying_asset_issuer,
            selling_asset_type,
            selling_asset_code,
            selling_asset_issuer,
        } => map_offer(
            op,
            "manage_buy_offer",
            "manage_buy_offer(asset,asset,amount,price)",
            amount,
            price,
            Some(offer_id.as_str()),
            false,
            asset_parts(selling_asset_type, selling_asset_code, selling_asset_issuer),
            asset_parts(buying_asset_type, buying_asset_code, buying_asset_issuer),
        ),
        OperationDetail::CreatePassiveSellOffer {
            amount,
            price,
            buying_asset_type,
            buying_asset_code,
            buying_asset_issuer,
            selling_asset_type,
            selling_asset_code,
            selling_asset_issuer,
        } => map_offer(
            op,
            "create_passive_sell_offer",
            "create_passive_sell_offer(asset,asset,amount,price)",
            amount,
            price,
            None,
            true,
            asset_parts(selling_asset_type, selling_asset_code, selling_asset_issuer),
            asset_parts(buying_asset_type, buying_asset_code, buying_asset_issuer),
        ),
        OperationDetail::SetOptions {
            inflation_dest,
            home_domain,
            signer_key,
            signer_weight,
            master_key_weight,
            low_threshold,
            med_threshold,
            high_threshold,
            set_flags_s,
            clear_flags_s,
        } => map_set_options(
            op,
            inflation_dest,
            home_domain,
            signer_key,
            signer_weight,
            master_key_weight,
            low_threshold,
            med_threshold,
            high_threshold,
            set_flags_s,
            clear_flags_s,
        ),
        OperationDetail::ChangeTrust {
            trustor,
            trustee,
            asset_type,
            asset_code,
            asset_issuer,
            limit,
        } => map_change_trust(
            op,
            trustor,
            trustee,
            asset_parts(asset_type, asset_code, asset_issuer),
            limit,
        ),
        OperationDetail::AllowTrust {
            trustor,
            trustee,
            asset_type,
            asset_code,
            asset_issuer,
            authorize,
        } => map_allow_trust(
            op,
            trustor,
            trustee,
            asset_parts(asset_type, asset_code, asset_issuer),
            *authorize,
        ),
        OperationDetail::AccountMerge { account, into } => {
            map_account_merge(op, account, into, effects)
        }
        OperationDetail::Inflation {} => MappedCall {
            from: op.source_account.clone(),
            operation_type: "inflation",
            signature: "inflation()",
            ..MappedCall::default()
        },
        OperationDetail::ManageData { name, value } => map_manage_data(op, name, value),
        OperationDetail::BumpSequence { bump_to } => map_bump_sequence(op, bump_to),
        OperationDetail::Unknown => MappedCall {
            from: op.source_account.clone(),
            ..MappedCall::default()
        },
    }
}

/// Assets referenced by an operation, for the derived asset stream.
pub fn assets_of(op: &OperationRecord) -> Vec<Asset> {
    match &op.detail {
        OperationDetail::Payment {
            asset_type,
            asset_code,
            asset_issuer,
            ..
        } => vec![asset_parts(asset_type, asset_code, asset_issuer)],
        OperationDetail::PathPaymentStrictReceive {
            asset_type,
            asset_code,
            asset_issuer,
            source_asset_type,
            source_asset_code,
            source_asset_issuer,
            ..
        }
        | OperationDetail::PathPaymentStrictSend {
            asset_type,
            asset_code,
            asset_issuer,
            source_asset_type,
            source_asset_code,
            source_asset_issuer,
            ..
        } => {
            let mut assets = vec![asset_parts(asset_type, asset_code, asset_issuer)];
            if let Some(source) =
                opt_asset_parts(source_asset_type, source_asset_code, source_asset_issuer)
            {
                assets.push(source);
            }
            assets
        }
        OperationDetail::ManageSellOffer {
            buying_asset_type,
            buying_asset_code,
            buying_asset_issuer,
            selling_asset_type,
            selling_asset_code,
            selling_asset_issuer,
            ..
        }
        | OperationDetail::ManageBuyOffer {
            buying_asset_type,
            buying_asset_code,
            buying_asset_issuer,
            selling_asset_type,
            selling_asset_code,
            selling_asset_issuer,
            ..
        }
        | OperationDetail::CreatePassiveSellOffer {
            buying_asset_type,
            buying_asset_code,
            buying_asset_issuer,
            selling_asset_type,
            selling_asset_code,
            selling_asset_issuer,
            ..
        } => vec![
            asset_parts(selling_asset_type, selling_asset_code, selling_asset_issuer),
            asset_parts(buying_asset_type, buying_asset_code, buying_asset_issuer),
        ],
        OperationDetail::ChangeTrust {
            asset_type,
            asset_code,
            asset_issuer,
            ..
        }
        | OperationDetail::AllowTrust {
            asset_type,
            asset_code,
            asset_issuer,
            ..
        } => vec![asset_parts(asset_type, asset_code, asset_issuer)],
        _ => Vec::new(),
    }
}

/// Accounts referenced by an operation, for the derived address stream.
pub fn referenced_accounts(op: &OperationRecord) -> Vec<String> {
    let mut accounts = Vec::new();
    let mut push = |value: &Option<String>| {
        if let Some(account) = value {
            if !account.is_empty() {
                accounts.push(account.clone());
            }
        }
    };

    match &op.detail {
        OperationDetail::CreateAccount {
            funder, account, ..
        } => {
            push(funder);
            push(account);
        }
        OperationDetail::Payment { from, to, .. }
        | OperationDetail::PathPaymentStrictReceive { from, to, .. }
        | OperationDetail::PathPaymentStrictSend { from, to, .. } => {
            push(from);
            push(to);
        }
        OperationDetail::SetOptions { inflation_dest, .. } => push(inflation_dest),
        OperationDetail::ChangeTrust {
            trustor, trustee, ..
        }
        | OperationDetail::AllowTrust {
            trustor, trustee, ..
        } => {
            push(trustor);
            push(trustee);
        }
        OperationDetail::AccountMerge { account, into } => {
            push(account);
            push(into);
        }
        _ => {}
    }

    if !op.source_account.is_empty() {
        accounts.push(op.source_account.clone());
    }
    accounts
}

fn asset_parts(asset_type: &str, code: &Option<String>, issuer: &Option<String>) -> Asset {
    Asset::from_parts(asset_type, code.as_deref(), issuer.as_deref())
}

fn opt_asset_parts(
    asset_type: &Option<String>,
    code: &Option<String>,
    issuer: &Option<String>,
) -> Option<Asset> {
    asset_type
        .as_ref()
        .map(|t| Asset::from_parts(t, code.as_deref(), issuer.as_deref()))
}

/// Display label for an asset: `native` or the credit code.
fn asset_label(asset: &Asset) -> String {
    match asset.code() {
        Some(code) => code.to_string(),
        None => asset.type_code().to_string(),
    }
}

fn account_or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn map_create_account(
    op: &OperationRecord,
    funder: &Option<String>,
    account: &Option<String>,
    starting_balance: &str,
) -> MappedCall {
    MappedCall {
        from: funder
            .clone()
            .unwrap_or_else(|| op.source_account.clone()),
        to: account_or_empty(account),
        operation_type: "create_account",
        asset: Some(Asset::Native),
        value: starting_balance.to_string(),
        arguments: vec![
            FunctionArgument::new("destination", "address", account_or_empty(account)),
            FunctionArgument::new("starting_balance", "amount", starting_balance),
        ],
        signature: "create_account(address,amount)",
        ..MappedCall::default()
    }
}

fn map_payment(
    from: &Option<String>,
    to: &Option<String>,
    amount: &str,
    asset: Asset,
) -> MappedCall {
    let lumens_transferred = if asset.is_native() {
        amount.to_string()
    } else {
        ZERO.to_string()
    };

    MappedCall {
        from: account_or_empty(from),
        to: account_or_empty(to),
        operation_type: "payment",
        value: amount.to_string(),
        lumens_transferred,
        arguments: vec![
            FunctionArgument::new("destination", "address", account_or_empty(to)),
            FunctionArgument::new("asset", "asset", asset_label(&asset)),
            FunctionArgument::new("amount", "amount", amount),
        ],
        signature: "payment(address,asset,amount)",
        asset: Some(asset),
        ..MappedCall::default()
    }
}

#[allow(clippy::too_many_arguments)]
fn map_path_payment(
    operation_type: &'static str,
    signature: &'static str,
    from: &Option<String>,
    to: &Option<String>,
    amount: &str,
    source_amount: &str,
    bound: (&'static str, &str),
    asset: Asset,
    source_asset: Option<Asset>,
) -> MappedCall {
    let source_label = source_asset
        .as_ref()
        .map(asset_label)
        .unwrap_or_default();

    let mut metadata = BTreeMap::new();
    metadata.insert("source_asset".to_string(), source_label.clone());
    metadata.insert("source_amount".to_string(), source_amount.to_string());
    metadata.insert(bound.0.to_string(), bound.1.to_string());

    MappedCall {
        from: account_or_empty(from),
        to: account_or_empty(to),
        operation_type,
        value: amount.to_string(),
        // Lumens stay zero here: only payment and account_merge compute the
        // native amount moved, even when one path leg is native.
        metadata,
        arguments: vec![
            FunctionArgument::new("source_asset", "asset", source_label),
            FunctionArgument::new(bound.0, "amount", bound.1),
            FunctionArgument::new("destination", "address", account_or_empty(to)),
            FunctionArgument::new("asset", "asset", asset_label(&asset)),
            FunctionArgument::new("amount", "amount", amount),
        ],
        signature,
        asset: Some(asset),
        ..MappedCall::default()
    }
}

#[allow(clippy::too_many_arguments)]
fn map_offer(
    op: &OperationRecord,
    operation_type: &'static str,
    signature: &'static str,
    amount: &str,
    price: &str,
    offer_id: Option<&str>,
    passive: bool,
    selling: Asset,
    buying: Asset,
) -> MappedCall {
    let mut metadata = BTreeMap::new();
    metadata.insert("price".to_string(), price.to_string());
    metadata.insert("buying_asset".to_string(), asset_label(&buying));
    if let Some(offer_id) = offer_id {
        metadata.insert("offer_id".to_string(), offer_id.to_string());
    }
    if passive {
        metadata.insert("passive".to_string(), "true".to_string());
    }

    MappedCall {
        from: op.source_account.clone(),
        operation_type,
        value: amount.to_string(),
        metadata,
        arguments: vec![
            FunctionArgument::new("selling", "asset", asset_label(&selling)),
            FunctionArgument::new("buying", "asset", asset_label(&buying)),
            FunctionArgument::new("amount", "amount", amount),
            FunctionArgument::new("price", "price", price),
        ],
        signature,
        asset: Some(selling),
        ..MappedCall::default()
    }
}

#[allow(clippy::too_many_arguments)]
fn map_set_options(
    op: &OperationRecord,
    inflation_dest: &Option<String>,
    home_domain: &Option<String>,
    signer_key: &Option<String>,
    signer_weight: &Option<u32>,
    master_key_weight: &Option<u32>,
    low_threshold: &Option<u32>,
    med_threshold: &Option<u32>,
    high_threshold: &Option<u32>,
    set_flags: &[String],
    clear_flags: &[String],
) -> MappedCall {
    let mut metadata = BTreeMap::new();
    let mut put = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            metadata.insert(key.to_string(), value);
        }
    };

    put("home_domain", home_domain.clone());
    put("signer_key", signer_key.clone());
    put("signer_weight", signer_weight.map(|w| w.to_string()));
    put("master_key_weight", master_key_weight.map(|w| w.to_string()));
    put("low_threshold", low_threshold.map(|t| t.to_string()));
    put("med_threshold", med_threshold.map(|t| t.to_string()));
    put("high_threshold", high_threshold.map(|t| t.to_string()));
    if !set_flags.is_empty() {
        put("set_flags", Some(set_flags.iter().join(",")));
    }
    if !clear_flags.is_empty() {
        put("clear_flags", Some(clear_flags.iter().join(",")));
    }

    MappedCall {
        from: op.source_account.clone(),
        to: account_or_empty(inflation_dest),
        operation_type: "set_options",
        metadata,
        signature: "set_options()",
        ..MappedCall::default()
    }
}

fn map_change_trust(
    op: &OperationRecord,
    trustor: &Option<String>,
    trustee: &Option<String>,
    asset: Asset,
    limit: &str,
) -> MappedCall {
    MappedCall {
        from: trustor
            .clone()
            .unwrap_or_else(|| op.source_account.clone()),
        to: account_or_empty(trustee),
        operation_type: "change_trust",
        value: limit.to_string(),
        arguments: vec![
            FunctionArgument::new("asset", "asset", asset_label(&asset)),
            FunctionArgument::new("limit", "amount", limit),
        ],
        signature: "change_trust(asset,amount)",
        asset: Some(asset),
        ..MappedCall::default()
    }
}

fn map_allow_trust(
    op: &OperationRecord,
    trustor: &Option<String>,
    trustee: &Option<String>,
    asset: Asset,
    authorize: bool,
) -> MappedCall {
    let mut metadata = BTreeMap::new();
    metadata.insert("authorize".to_string(), authorize.to_string());

    MappedCall {
        from: trustee
            .clone()
            .unwrap_or_else(|| op.source_account.clone()),
        to: account_or_empty(trustor),
        operation_type: "allow_trust",
        metadata,
        arguments: vec![
            FunctionArgument::new("trustor", "address", account_or_empty(trustor)),
            FunctionArgument::new("asset", "asset", asset_label(&asset)),
            FunctionArgument::new("authorize", "bool", authorize.to_string()),
        ],
        signature: "allow_trust(address,asset,bool)",
        asset: Some(asset),
        ..MappedCall::default()
    }
}

fn map_manage_data(op: &OperationRecord, name: &str, value: &Option<String>) -> MappedCall {
    let mut metadata = BTreeMap::new();
    metadata.insert("name".to_string(), name.to_string());
    // An absent value deletes the entry upstream; published as empty.
    metadata.insert("value".to_string(), value.clone().unwrap_or_default());

    MappedCall {
        from: op.source_account.clone(),
        operation_type: "manage_data",
        metadata,
        arguments: vec![
            FunctionArgument::new("name", "string", name),
            FunctionArgument::new("value", "string", value.clone().unwrap_or_default()),
        ],
        signature: "manage_data(string,string)",
        ..MappedCall::default()
    }
}

fn map_bump_sequence(op: &OperationRecord, bump_to: &str) -> MappedCall {
    let mut metadata = BTreeMap::new();
    metadata.insert("bump_to".to_string(), bump_to.to_string());

    MappedCall {
        from: op.source_account.clone(),
        operation_type: "bump_sequence",
        metadata,
        arguments: vec![FunctionArgument::new("bump_to", "sequence", bump_to)],
        signature: "bump_sequence(sequence)",
        ..MappedCall::default()
    }
}

/// Map an account merge, deriving the native amount moved from the
/// operation's effects.
///
/// The effect list must balance: total native debited equals total native
/// credited. A mismatch (or an unparseable amount) is a data-integrity
/// condition — the amount degrades to zero and the condition is recorded in
/// the metadata, never thrown.
fn map_account_merge(
    op: &OperationRecord,
    account: &Option<String>,
    into: &Option<String>,
    effects: &[EffectRecord],
) -> MappedCall {
    let mut metadata = BTreeMap::new();
    let amount = match merged_native_amount(effects) {
        Ok(debited) => format_amount(debited),
        Err(detail) => {
            warn!(
                "Account merge {} failed integrity check: {}",
                op.id, detail
            );
            metadata.insert(METADATA_DATA_INTEGRITY.to_string(), detail.to_string());
            ZERO.to_string()
        }
    };

    MappedCall {
        from: account
            .clone()
            .unwrap_or_else(|| op.source_account.clone()),
        to: account_or_empty(into),
        operation_type: "account_merge",
        asset: Some(Asset::Native),
        value: amount.clone(),
        lumens_transferred: amount,
        metadata,
        arguments: vec![FunctionArgument::new(
            "destination",
            "address",
            account_or_empty(into),
        )],
        signature: "account_merge(address)",
        ..MappedCall::default()
    }
}

/// Sum the native debits of a merge's effect list, cross-checking that
/// debits and credits balance.
fn merged_native_amount(effects: &[EffectRecord]) -> Result<i128, &'static str> {
    let mut debited = 0i128;
    let mut credited = 0i128;

    for effect in effects {
        if effect.asset_type.as_deref() != Some("native") {
            continue;
        }
        let amount = match &effect.amount {
            Some(amount) => parse_amount(amount).ok_or("merge_effect_amount_unparseable")?,
            None => continue,
        };
        match effect.effect_type.as_str() {
            "account_debited" => debited += amount,
            "account_credited" => credited += amount,
            _ => {}
        }
    }

    if debited != credited {
        return Err("merge_debit_credit_mismatch");
    }
    Ok(debited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeChainClient;
    use std::sync::Arc;

    fn enricher(client: FakeChainClient) -> EntityEnricher {
        EntityEnricher::new(Arc::new(client), 16)
    }

    fn payment_op(asset_type: &str, code: Option<&str>, issuer: Option<&str>) -> OperationRecord {
        FakeChainClient::operation(
            "op-1",
            "txhash",
            OperationDetail::Payment {
                from: Some("GALICE".to_string()),
                to: Some("GBOB".to_string()),
                amount: "100.0000000".to_string(),
                asset_type: asset_type.to_string(),
                asset_code: code.map(str::to_string),
                asset_issuer: issuer.map(str::to_string),
            },
        )
    }

    #[tokio::test]
    async fn native_payment_moves_lumens() {
        let enricher = enricher(FakeChainClient::default());
        let call = map_operation(&payment_op("native", None, None), 500, 0, &enricher).await;

        assert_eq!(call.operation_type, "payment");
        assert_eq!(call.from, "GALICE");
        assert_eq!(call.to, "GBOB");
        assert_eq!(call.value, "100.0000000");
        assert_eq!(call.lumens_transferred, "100.0000000");
        assert_eq!(call.asset_type.as_deref(), Some("native"));
        assert_eq!(call.depth, 0);
    }

    #[tokio::test]
    async fn credit_payment_moves_no_lumens() {
        let op = payment_op("credit_alphanum4", Some("USD"), Some("GISSUER"));
        let call = map_operation(&op, 500, 0, &enricher(FakeChainClient::default())).await;

        assert_eq!(call.lumens_transferred, "0");
        assert_eq!(call.asset_type.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn mapping_is_idempotent() {
        let mut client = FakeChainClient::default();
        client.effects.insert(
            "op-1".to_string(),
            vec![EffectRecord {
                effect_type: "account_credited".to_string(),
                amount: Some("100.0000000".to_string()),
                asset_type: Some("native".to_string()),
            }],
        );
        let enricher = enricher(client);
        let op = payment_op("native", None, None);

        let first = map_operation(&op, 500, 3, &enricher).await;
        let second = map_operation(&op, 500, 3, &enricher).await;

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.hash, content_hash(500, "txhash", 3));
        assert_eq!(first.effects, "account_credited");
    }

    #[tokio::test]
    async fn unknown_variant_maps_to_sentinel() {
        let op = FakeChainClient::operation("op-9", "txhash", OperationDetail::Unknown);
        let call = map_operation(&op, 500, 1, &enricher(FakeChainClient::default())).await;

        assert_eq!(call.operation_type, "unknown");
        assert!(call.arguments.is_empty());
        assert_eq!(call.value, "0");
        assert!(!call.hash.is_empty());
    }

    fn merge_effects(debited: &str, credited: &str) -> Vec<EffectRecord> {
        vec![
            EffectRecord {
                effect_type: "account_debited".to_string(),
                amount: Some(debited.to_string()),
                asset_type: Some("native".to_string()),
            },
            EffectRecord {
                effect_type: "account_credited".to_string(),
                amount: Some(credited.to_string()),
                asset_type: Some("native".to_string()),
            },
        ]
    }

    fn merge_op() -> OperationRecord {
        FakeChainClient::operation(
            "op-m",
            "txhash",
            OperationDetail::AccountMerge {
                account: Some("GALICE".to_string()),
                into: Some("GBOB".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn balanced_merge_reports_native_amount() {
        let mut client = FakeChainClient::default();
        client
            .effects
            .insert("op-m".to_string(), merge_effects("100", "100"));
        let call = map_operation(&merge_op(), 500, 0, &enricher(client)).await;

        assert_eq!(call.lumens_transferred, "100.0000000");
        assert_eq!(call.value, "100.0000000");
        assert!(!call.metadata.contains_key(METADATA_DATA_INTEGRITY));
    }

    #[tokio::test]
    async fn unbalanced_merge_degrades_to_zero() {
        let mut client = FakeChainClient::default();
        client
            .effects
            .insert("op-m".to_string(), merge_effects("100", "90"));
        let call = map_operation(&merge_op(), 500, 0, &enricher(client)).await;

        assert_eq!(call.lumens_transferred, "0");
        assert_eq!(
            call.metadata.get(METADATA_DATA_INTEGRITY).map(String::as_str),
            Some("merge_debit_credit_mismatch")
        );
    }

    #[test]
    fn assets_of_extracts_offer_pairs() {
        let op = FakeChainClient::operation(
            "op-o",
            "txhash",
            OperationDetail::ManageSellOffer {
                amount: "10".to_string(),
                price: "1.5".to_string(),
                offer_id: "42".to_string(),
                buying_asset_type: "credit_alphanum4".to_string(),
                buying_asset_code: Some("USD".to_string()),
                buying_asset_issuer: Some("GISSUER".to_string()),
                selling_asset_type: "native".to_string(),
                selling_asset_code: None,
                selling_asset_issuer: None,
            },
        );

        let assets = assets_of(&op);
        assert_eq!(assets.len(), 2);
        assert!(assets.contains(&Asset::Native));
        assert!(assets.contains(&Asset::CreditAlphanum4 {
            code: "USD".to_string(),
            issuer: "GISSUER".to_string(),
        }));
    }

    #[test]
    fn referenced_accounts_includes_source_and_counterparties() {
        let accounts = referenced_accounts(&payment_op("native", None, None));
        assert!(accounts.contains(&"GALICE".to_string()));
        assert!(accounts.contains(&"GBOB".to_string()));
        assert!(accounts.contains(&"GSOURCE".to_string()));
    }
}
