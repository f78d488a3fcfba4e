//! End-to-end obfuscation tests driving the engine with real client queries.

use std::collections::{BTreeMap, HashSet};

use pir_core::{
    AlgorithmType, CredentialInfo, ObfuscateDataItem, ObfuscationEngine, ObfuscationParam,
    OtResult, PirClient, PirRecord, PirTable, QueryParam, SearchType,
};
use proptest::prelude::*;

fn table(keys: &[String]) -> PirTable {
    let records = keys
        .iter()
        .map(|k| {
            let mut values = BTreeMap::new();
            values.insert("name".to_string(), k.to_uppercase());
            values.insert("len".to_string(), k.len().to_string());
            PirRecord::new(k.clone(), values)
        })
        .collect();
    PirTable::new("svc", "ds", "id", vec!["name".into(), "len".into()], records)
}

fn param(search_type: SearchType) -> QueryParam {
    QueryParam {
        service_id: "svc".into(),
        search_type,
        algorithm_type: String::new(),
        credential: CredentialInfo::sign("ak", "secret", "svc", 0, "n"),
    }
}

fn rows_for(
    table: &PirTable,
    algorithm: AlgorithmType,
    item: &ObfuscateDataItem,
) -> Vec<PirRecord> {
    match algorithm {
        AlgorithmType::IdFilter => {
            table.filter_prefix(item.filter.as_deref().unwrap_or_default())
        }
        AlgorithmType::IdObfuscation => table.find_keys(&item.candidates),
    }
}

/// Answer every item the way a service would.
fn answer(
    table: &PirTable,
    client: &PirClient,
    search_type: SearchType,
    keys: &[&str],
) -> (Vec<OtResult>, pir_core::QuerySecrets) {
    let engine = ObfuscationEngine::default();
    let (request, secrets) = client.build_query(param(search_type), keys).unwrap();
    request.check(64).unwrap();
    engine
        .check_items(client.algorithm(), &request.obfuscate_data.items)
        .unwrap();

    let base =
        ObfuscationParam::new(&request.obfuscate_data, client.algorithm(), search_type).unwrap();
    let results = request
        .obfuscate_data
        .items
        .iter()
        .map(|item| {
            let rows = rows_for(table, client.algorithm(), item);
            let param = base.clone().with_index(item.id_index);
            OtResult::new(engine.obfuscate(&param, &rows, item).unwrap())
        })
        .collect();
    (results, secrets)
}

fn algorithm_strategy() -> impl Strategy<Value = AlgorithmType> {
    prop_oneof![Just(AlgorithmType::IdFilter), Just(AlgorithmType::IdObfuscation)]
}

fn search_strategy() -> impl Strategy<Value = SearchType> {
    prop_oneof![Just(SearchType::SearchExist), Just(SearchType::SearchValue)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn requested_row_is_recovered(
        keys in prop::collection::hash_set("[a-z]{1,8}", 2..16),
        pick in any::<prop::sample::Index>(),
        algorithm in algorithm_strategy(),
        search_type in search_strategy(),
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        let table = table(&keys);
        let wanted = pick.get(&keys).clone();
        let client = PirClient::new(algorithm)
            .with_filter_length(1)
            .with_decoys(3)
            .with_decoy_pool(keys.clone());

        let (results, secrets) = answer(&table, &client, search_type, &[wanted.as_str()]);
        let payload = secrets.items()[0].decode(&results[0]);

        prop_assert!(payload.is_some());
        let payload = payload.unwrap();
        prop_assert_eq!(&payload.key, &wanted);
        match search_type {
            SearchType::SearchExist => prop_assert!(payload.values.is_none()),
            SearchType::SearchValue => {
                let values = payload.values.unwrap();
                prop_assert_eq!(&values["name"], &wanted.to_uppercase());
            }
        }
    }

    #[test]
    fn only_requested_row_opens(
        keys in prop::collection::hash_set("[a-z]{1,6}", 4..24),
        pick in any::<prop::sample::Index>(),
        algorithm in algorithm_strategy(),
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        let table = table(&keys);
        let wanted = pick.get(&keys).clone();
        let client = PirClient::new(algorithm)
            .with_filter_length(1)
            .with_decoy_pool(keys.clone());

        let (results, secrets) =
            answer(&table, &client, SearchType::SearchValue, &[wanted.as_str()]);

        // Each encrypted row opened on its own: exactly one yields a payload
        let secret = &secrets.items()[0];
        let opened = results[0]
            .items
            .iter()
            .filter(|item| secret.decode(&OtResult::new(vec![(*item).clone()])).is_some())
            .count();
        prop_assert_eq!(opened, 1);
    }

    #[test]
    fn absent_key_yields_empty_or_unopenable_result(
        keys in prop::collection::hash_set("[a-z]{1,8}", 1..16),
        algorithm in algorithm_strategy(),
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        let table = table(&keys);
        let client = PirClient::new(algorithm)
            .with_filter_length(2)
            .with_decoys(3)
            .with_decoy_pool(keys.clone());

        let (results, secrets) =
            answer(&table, &client, SearchType::SearchExist, &["ABSENT-KEY"]);
        prop_assert!(secrets.items()[0].decode(&results[0]).is_none());
        if algorithm == AlgorithmType::IdObfuscation {
            // Every decoy is a real row, none of them opens
            prop_assert_eq!(results[0].items.len(), keys.len().min(3));
        }
    }
}

#[test]
fn multi_item_results_follow_item_order() {
    let keys: Vec<String> = ["alice", "bob", "carol", "dave", "erin"]
        .iter()
        .map(|k| k.to_string())
        .collect();
    let table = table(&keys);
    let client = PirClient::new(AlgorithmType::IdFilter).with_filter_length(2);

    let (results, secrets) = answer(
        &table,
        &client,
        SearchType::SearchValue,
        &["erin", "missing", "alice"],
    );
    assert_eq!(results.len(), 3);

    let decoded: Vec<Option<String>> = secrets
        .items()
        .iter()
        .zip(&results)
        .map(|(secret, result)| secret.decode(result).map(|p| p.key))
        .collect();
    assert_eq!(
        decoded,
        vec![Some("erin".to_string()), None, Some("alice".to_string())]
    );
}

#[test]
fn another_query_cannot_open_the_answer() {
    let keys: Vec<String> = vec!["alice".into(), "bob".into()];
    let table = table(&keys);
    let client = PirClient::new(AlgorithmType::IdObfuscation).with_decoy_pool(keys.clone());

    let (results, _) = answer(&table, &client, SearchType::SearchValue, &["alice"]);
    let (_, other) = client
        .build_query(param(SearchType::SearchValue), &["alice"])
        .unwrap();
    assert!(other.items()[0].decode(&results[0]).is_none());
}

#[test]
fn fresh_randomness_per_answer() {
    let keys: Vec<String> = vec!["alice".into()];
    let table = table(&keys);
    let engine = ObfuscationEngine::default();
    let client = PirClient::new(AlgorithmType::IdObfuscation).with_decoy_pool(["bob", "carol"]);
    let (request, _) = client
        .build_query(param(SearchType::SearchExist), &["alice"])
        .unwrap();
    let item = &request.obfuscate_data.items[0];
    let rows = table.find_keys(&item.candidates);
    let param = ObfuscationParam::new(
        &request.obfuscate_data,
        AlgorithmType::IdObfuscation,
        SearchType::SearchExist,
    )
    .unwrap();

    let first = engine.obfuscate(&param, &rows, item).unwrap();
    let second = engine.obfuscate(&param, &rows, item).unwrap();
    assert_ne!(first, second);
    let unique: HashSet<_> = first.iter().chain(&second).map(|i| i.point_w.clone()).collect();
    assert_eq!(unique.len(), 2);
}

#[test]
fn candidate_matches_do_not_single_out_the_queried_key() {
    let keys: Vec<String> = (0..1000).map(|i| format!("user-{}", i)).collect();
    let table = table(&keys);
    let client = PirClient::new(AlgorithmType::IdObfuscation).with_decoy_pool(keys.clone());

    for _ in 0..8 {
        let (request, _) = client
            .build_query(param(SearchType::SearchExist), &["user-421"])
            .unwrap();
        let item = &request.obfuscate_data.items[0];
        let matched: HashSet<String> = table
            .find_keys(&item.candidates)
            .into_iter()
            .map(|row| row.key)
            .collect();

        // The service sees every candidate as a held row
        assert_eq!(matched.len(), item.candidates.len());
        assert!(matched.len() > 1);
        assert!(matched.contains("user-421"));
    }
}
