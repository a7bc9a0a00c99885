#![allow(non_snake_case)]

use super::*;
use chrono::{
    Local,
    TimeZone,
    Utc,
};
use plinko::{
    Error,
    Rejection,
    UserId,
    ledger::FixedClock,
    settings::GameSettings,
    simulator::OutcomeSimulator,
    stats::StatsScope,
    storage::{
        AccountStore,
        in_memory_storage::InMemoryStorage,
    },
};
use std::future::pending;
use tokio::sync::{
    mpsc,
    oneshot,
};

pub struct FakeQueryApi {
    recv: mpsc::Receiver<Query>,
}

impl FakeQueryApi {
    pub fn new_with_sender() -> (Self, mpsc::Sender<Query>) {
        let (send, recv) = mpsc::channel(10);
        (FakeQueryApi { recv }, send)
    }
}

impl QueryAPI for FakeQueryApi {
    async fn query(&mut self) -> crate::Result<Query> {
        match self.recv.recv().await {
            Some(query) => Ok(query),
            None => Err(anyhow::anyhow!("No more queries")),
        }
    }
}

type TestApp = App<FakeQueryApi, InMemoryStorage, StdRng, FixedClock>;

fn app_with_player(balance: i64) -> (TestApp, mpsc::Sender<Query>, UserId) {
    let now = Local.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap();
    let storage = InMemoryStorage::new();
    GameSettings::seed_defaults(&storage).unwrap();
    let player = storage
        .create_account("player", balance, now.with_timezone(&Utc))
        .unwrap();
    let ledger =
        LedgerService::with_parts(storage, OutcomeSimulator::seeded(3), FixedClock::new(now));
    let (api, sender) = FakeQueryApi::new_with_sender();
    (App::new(api, ledger), sender, player.id)
}

#[tokio::test]
async fn run__play_query__settles_and_answers_the_responder() {
    // given
    let (mut app, queries, player) = app_with_player(100);
    let (response_sender, response_receiver) = oneshot::channel();

    // when
    queries
        .send(Query::play(player, 10, 4, response_sender))
        .await
        .unwrap();
    let state = app.run(pending()).await.unwrap();

    // then
    assert_eq!(state, RunState::Continue);
    let outcome = response_receiver.await.unwrap().unwrap();
    assert_eq!(outcome.new_balance, 90 + outcome.payout);
    let stored = app.ledger().storage().account(player).unwrap().unwrap();
    assert_eq!(stored.balance, outcome.new_balance);
}

#[tokio::test]
async fn run__rejected_play__answers_with_the_rejection() {
    // given
    let (mut app, queries, player) = app_with_player(5);
    let (response_sender, response_receiver) = oneshot::channel();

    // when
    queries
        .send(Query::play(player, 10, 4, response_sender))
        .await
        .unwrap();
    app.run(pending()).await.unwrap();

    // then
    let result = response_receiver.await.unwrap();
    assert!(matches!(
        result,
        Err(Error::Rejected(Rejection::InsufficientBalance {
            balance: 5,
            bet: 10
        }))
    ));
}

#[tokio::test]
async fn run__stats_query__summarizes_the_requested_scope() {
    // given
    let (mut app, queries, player) = app_with_player(100);
    for _ in 0..2 {
        let (response_sender, _response_receiver) = oneshot::channel();
        queries
            .send(Query::play(player, 10, 4, response_sender))
            .await
            .unwrap();
        app.run(pending()).await.unwrap();
    }
    let (response_sender, response_receiver) = oneshot::channel();

    // when
    queries
        .send(Query::stats(StatsScope::ForUser(player), response_sender))
        .await
        .unwrap();
    app.run(pending()).await.unwrap();

    // then
    let summary = response_receiver.await.unwrap().unwrap();
    assert_eq!(summary.total_games, 2);
    assert_eq!(summary.total_wagered, 20);
    assert_eq!(summary.recent_games.len(), 2);
}

#[tokio::test]
async fn run__dropped_responder__still_commits_the_play() {
    // given
    let (mut app, queries, player) = app_with_player(100);
    let (response_sender, response_receiver) = oneshot::channel();
    drop(response_receiver);

    // when
    queries
        .send(Query::play(player, 10, 4, response_sender))
        .await
        .unwrap();
    app.run(pending()).await.unwrap();

    // then
    let stats = app
        .ledger()
        .stats(StatsScope::All, &plinko::stats::StatsOptions::default())
        .unwrap();
    assert_eq!(stats.total_games, 1);
}

#[tokio::test]
async fn run__interrupt__exits_without_waiting_for_queries() {
    // given
    let (mut app, _queries, _player) = app_with_player(100);

    // when
    let state = app.run(async {}).await.unwrap();

    // then
    assert_eq!(state, RunState::Exit);
}

#[tokio::test]
async fn run__admin_queries__change_the_live_ledger() {
    // given
    let (mut app, queries, player) = app_with_player(100);
    let (register_sender, register_receiver) = oneshot::channel();
    let (points_sender, points_receiver) = oneshot::channel();
    let (setting_sender, setting_receiver) = oneshot::channel();

    // when
    queries
        .send(Query::Admin(AdminQuery::Register {
            username: "newcomer".to_string(),
            balance: 40,
            sender: register_sender,
        }))
        .await
        .unwrap();
    queries
        .send(Query::Admin(AdminQuery::AdjustPoints {
            username: "player".to_string(),
            amount: -30,
            sender: points_sender,
        }))
        .await
        .unwrap();
    queries
        .send(Query::Admin(AdminQuery::UpdateSetting {
            key: "enabled".to_string(),
            value: "off".to_string(),
            sender: setting_sender,
        }))
        .await
        .unwrap();
    for _ in 0..3 {
        app.run(pending()).await.unwrap();
    }

    // then
    let newcomer = register_receiver.await.unwrap().unwrap();
    assert_eq!(newcomer.balance, 40);
    assert_eq!(points_receiver.await.unwrap().unwrap().balance, 70);
    assert!(!setting_receiver.await.unwrap().unwrap().enabled);
    let stored = app.ledger().storage().account(player).unwrap().unwrap();
    assert_eq!(stored.balance, 70);
}

#[tokio::test]
async fn run__stats_query_with_options__overrides_app_defaults() {
    // given
    let (mut app, queries, player) = app_with_player(100);
    let (play_sender, play_receiver) = oneshot::channel();
    let (stats_sender, stats_receiver) = oneshot::channel();
    let options = plinko::stats::StatsOptions {
        top_players: 0,
        recent_games: 0,
    };

    // when
    queries
        .send(Query::play(player, 10, 4, play_sender))
        .await
        .unwrap();
    queries
        .send(Query::stats_with(StatsScope::All, options, stats_sender))
        .await
        .unwrap();
    app.run(pending()).await.unwrap();
    app.run(pending()).await.unwrap();

    // then
    play_receiver.await.unwrap().unwrap();
    let summary = stats_receiver.await.unwrap().unwrap();
    assert_eq!(summary.total_games, 1);
    assert!(summary.recent_games.is_empty());
    assert!(summary.top_players.is_empty());
}
