// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ethers::abi::Token;
use ethers::types::{Address, U64};
use wallet_activator_store::{
    InMemoryStore, PolicyStateRecord, ProposalRecord, ProposalStore,
};

use super::*;

const BLOCK: u64 = 42;

fn chain() -> Chain {
    "zksync".parse().unwrap()
}

fn account() -> UAddress {
    UAddress::new(chain(), Address::repeat_byte(0xaa))
}

fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new().unwrap())
}

fn added_log(key: u16, hash: H256, tx: H256, block: u64) -> ChainLog {
    let log = Log {
        address: account().address(),
        topics: vec![
            PolicyAddedFilter::signature(),
            H256::from_low_u64_be(u64::from(key)),
        ],
        data: ethers::abi::encode(&[Token::FixedBytes(hash.0.to_vec())])
            .into(),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(tx),
        ..Default::default()
    };
    ChainLog::new(chain(), log)
}

fn removed_log(key: u16, tx: H256, block: u64) -> ChainLog {
    let log = Log {
        address: account().address(),
        topics: vec![
            PolicyRemovedFilter::signature(),
            H256::from_low_u64_be(u64::from(key)),
        ],
        block_number: Some(U64::from(block)),
        transaction_hash: Some(tx),
        ..Default::default()
    };
    ChainLog::new(chain(), log)
}

fn state(key: u16, approver: u8) -> PolicyStateRecord {
    PolicyStateRecord::draft(
        account(),
        PolicyKey(key),
        1,
        vec![Address::repeat_byte(approver)],
    )
}

/// Stores a proposal submitted in `tx` and returns its id.
fn proposal(store: &InMemoryStore, id: u64, tx: H256) -> u64 {
    store
        .insert_proposal(&ProposalRecord {
            id,
            account: account(),
            transaction: Some(tx),
        })
        .unwrap();
    id
}

fn activation_block(store: &InMemoryStore, id: PolicyStateId) -> Option<u64> {
    store.get_policy_state(id).unwrap().unwrap().activation_block
}

fn handler(
    store: &InMemoryStore,
    match_state_hash: bool,
) -> PolicyEventsHandler<InMemoryStore> {
    PolicyEventsHandler::new(
        Arc::new(store.clone()),
        PolicyMatching { match_state_hash },
        metrics(),
    )
}

#[test]
fn reconcile_describes_the_update() {
    let tx = H256::repeat_byte(7);
    let log = added_log(3, H256::repeat_byte(9), tx, BLOCK);
    let event = AccountEvents::PolicyAddedFilter(PolicyAddedFilter {
        key: 3,
        hash: [9; 32],
    });

    let loose =
        reconcile(&event, &chain(), &log.log, PolicyMatching::default())
            .unwrap();
    assert_eq!(loose.block_number, BLOCK);
    assert_eq!(loose.filter.account, account());
    assert_eq!(loose.filter.key, PolicyKey(3));
    assert_eq!(loose.filter.transaction_hash, tx);
    assert_eq!(loose.filter.state_hash, None);

    let strict = reconcile(
        &event,
        &chain(),
        &log.log,
        PolicyMatching {
            match_state_hash: true,
        },
    )
    .unwrap();
    assert_eq!(strict.filter.state_hash, Some(H256::repeat_byte(9)));
}

#[test]
fn reconcile_needs_log_metadata() {
    let event = AccountEvents::PolicyRemovedFilter(PolicyRemovedFilter {
        key: 1,
    });
    let mut log = removed_log(1, H256::repeat_byte(7), BLOCK).log;
    log.block_number = None;
    let err = reconcile(&event, &chain(), &log, PolicyMatching::default())
        .unwrap_err();
    assert!(matches!(err, Error::MissingLogMetadata("block_number")));

    let mut log = removed_log(1, H256::repeat_byte(7), BLOCK).log;
    log.transaction_hash = None;
    let err = reconcile(&event, &chain(), &log, PolicyMatching::default())
        .unwrap_err();
    assert!(matches!(err, Error::MissingLogMetadata("transaction_hash")));
}

#[test]
fn confirms_the_state_of_the_emitting_proposal() {
    let store = InMemoryStore::default();
    let tx = H256::repeat_byte(0x11);
    let other_tx = H256::repeat_byte(0x22);
    let p1 = proposal(&store, 1, tx);
    let p2 = proposal(&store, 2, other_tx);
    let proposed = store
        .insert_policy_state(state(1, 1).with_proposal(p1))
        .unwrap();
    let elsewhere = store
        .insert_policy_state(state(1, 2).with_proposal(p2))
        .unwrap();
    let other_key = store
        .insert_policy_state(state(2, 3).with_proposal(p1))
        .unwrap();

    let activated = handler(&store, false)
        .apply(&added_log(1, H256::zero(), tx, BLOCK))
        .unwrap();

    assert_eq!(activated, vec![proposed]);
    assert_eq!(activation_block(&store, proposed), Some(BLOCK));
    assert_eq!(activation_block(&store, elsewhere), None);
    assert_eq!(activation_block(&store, other_key), None);
}

#[test]
fn confirms_the_genesis_state_without_a_proposal() {
    let store = InMemoryStore::default();
    let genesis = store.insert_policy_state(state(1, 1).init_state()).unwrap();
    let removed_genesis =
        store.insert_policy_state(state(2, 2).init_state()).unwrap();

    let handler = handler(&store, false);
    handler
        .apply(&added_log(1, H256::zero(), H256::repeat_byte(5), BLOCK))
        .unwrap();
    handler
        .apply(&removed_log(2, H256::repeat_byte(6), BLOCK + 1))
        .unwrap();

    assert_eq!(activation_block(&store, genesis), Some(BLOCK));
    assert_eq!(activation_block(&store, removed_genesis), Some(BLOCK + 1));
}

#[test]
fn redelivery_keeps_the_first_block() {
    let store = InMemoryStore::default();
    let tx = H256::repeat_byte(0x11);
    let p = proposal(&store, 1, tx);
    let id = store.insert_policy_state(state(1, 1).with_proposal(p)).unwrap();

    let handler = handler(&store, false);
    assert_eq!(
        handler.apply(&added_log(1, H256::zero(), tx, BLOCK)).unwrap(),
        vec![id]
    );
    assert!(handler
        .apply(&added_log(1, H256::zero(), tx, BLOCK + 10))
        .unwrap()
        .is_empty());
    assert_eq!(activation_block(&store, id), Some(BLOCK));
}

#[test]
fn one_proposal_with_two_states_of_a_policy() {
    let tx = H256::repeat_byte(0x11);
    let setup = || {
        let store = InMemoryStore::default();
        let p = proposal(&store, 1, tx);
        let first =
            store.insert_policy_state(state(1, 1).with_proposal(p)).unwrap();
        let second =
            store.insert_policy_state(state(1, 2).with_proposal(p)).unwrap();
        (store, first, second)
    };
    let hash_of = |store: &InMemoryStore, id| {
        store
            .get_policy_state(id)
            .unwrap()
            .unwrap()
            .to_policy()
            .unwrap()
            .hash()
    };

    // without the hash, the event cannot tell the two states apart.
    let (store, first, second) = setup();
    let hash = hash_of(&store, first);
    let activated = handler(&store, false)
        .apply(&added_log(1, hash, tx, BLOCK))
        .unwrap();
    assert_eq!(activated, vec![first, second]);

    let (store, first, second) = setup();
    let hash = hash_of(&store, first);
    let activated = handler(&store, true)
        .apply(&added_log(1, hash, tx, BLOCK))
        .unwrap();
    assert_eq!(activated, vec![first]);
    assert_eq!(activation_block(&store, second), None);
}

#[test]
fn removal_ignores_the_state_hash() {
    let store = InMemoryStore::default();
    let tx = H256::repeat_byte(0x11);
    let p = proposal(&store, 1, tx);
    let id = store
        .insert_policy_state(state(1, 1).removal().with_proposal(p))
        .unwrap();

    let activated = handler(&store, true)
        .apply(&removed_log(1, tx, BLOCK))
        .unwrap();
    assert_eq!(activated, vec![id]);
}

#[test]
fn unrelated_logs_fail_to_decode() {
    let store = InMemoryStore::default();
    let mut log = removed_log(1, H256::repeat_byte(1), BLOCK);
    log.log.topics[0] = H256::repeat_byte(0xff);
    assert!(handler(&store, false).apply(&log).is_err());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn registered_handler_receives_dispatched_logs() {
    let store = InMemoryStore::default();
    let genesis = store.insert_policy_state(state(4, 1).init_state()).unwrap();
    let metrics = metrics();
    let registry = EventRegistry::new(metrics.clone());
    let handler = Arc::new(PolicyEventsHandler::new(
        Arc::new(store.clone()),
        PolicyMatching::default(),
        metrics.clone(),
    ));

    let ids = register(&registry, handler);
    assert_eq!(ids.len(), 2);
    let mut subscribed = registry.signatures();
    subscribed.sort();
    let mut expected = signatures().to_vec();
    expected.sort();
    assert_eq!(subscribed, expected);

    registry
        .dispatch(&added_log(4, H256::zero(), H256::repeat_byte(3), BLOCK))
        .await
        .unwrap();
    assert_eq!(activation_block(&store, genesis), Some(BLOCK));
    assert_eq!(metrics.policy_states_activated.get() as u64, 1);

    for (signature, id) in ids {
        assert!(registry.off(signature, id));
    }
    assert!(registry.signatures().is_empty());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn foreign_logs_with_a_policy_signature_are_skipped() {
    let store = InMemoryStore::default();
    let genesis = store.insert_policy_state(state(4, 1).init_state()).unwrap();
    let metrics = metrics();
    let registry = EventRegistry::new(metrics.clone());
    register(
        &registry,
        Arc::new(PolicyEventsHandler::new(
            Arc::new(store.clone()),
            PolicyMatching::default(),
            metrics.clone(),
        )),
    );

    // same topic0, but the key sits in the data instead of a topic
    let mut foreign = added_log(4, H256::zero(), H256::repeat_byte(3), BLOCK);
    foreign.log.address = Address::repeat_byte(0xee);
    foreign.log.topics.truncate(1);
    foreign.log.data = ethers::abi::encode(&[
        Token::Uint(4u64.into()),
        Token::FixedBytes(vec![0; 32]),
    ])
    .into();

    registry.dispatch(&foreign).await.unwrap();
    assert_eq!(metrics.policy_logs_skipped.get() as u64, 1);
    assert_eq!(metrics.handler_failures.get() as u64, 0);
    assert!(logs_contain("Skipping malformed policy log"));

    // later logs of the range are still applied
    registry
        .dispatch(&added_log(4, H256::zero(), H256::repeat_byte(3), BLOCK))
        .await
        .unwrap();
    assert_eq!(activation_block(&store, genesis), Some(BLOCK));
}
