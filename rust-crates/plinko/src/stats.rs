use crate::{
    Points,
    UserId,
    records::GameRecord,
    storage::GameRepository,
};
use itertools::Itertools;
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsScope {
    All,
    ForUser(UserId),
}

impl StatsScope {
    pub fn includes(&self, record: &GameRecord) -> bool {
        match self {
            StatsScope::All => true,
            StatsScope::ForUser(user) => record.user_id == *user,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StatsOptions {
    pub top_players: usize,
    pub recent_games: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            top_players: 5,
            recent_games: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub user_id: UserId,
    pub games: u64,
    pub total_wagered: Points,
    pub total_payout: Points,
    /// Payout minus wagered, from the player's side.
    pub net_profit: Points,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_games: u64,
    pub total_wagered: Points,
    pub total_payout: Points,
    pub house_profit: Points,
    /// Percentage of games with a non-zero payout, one decimal place.
    pub win_rate: f64,
    pub biggest_win: Option<Points>,
    pub top_players: Vec<PlayerSummary>,
    /// Newest first.
    pub recent_games: Vec<GameRecord>,
}

pub fn aggregate(
    records: &[GameRecord],
    scope: StatsScope,
    options: &StatsOptions,
) -> StatsSummary {
    let scoped: Vec<&GameRecord> = records.iter().filter(|r| scope.includes(r)).collect();

    let total_games = scoped.len() as u64;
    let total_wagered: Points = scoped.iter().map(|r| r.bet_amount).sum();
    let total_payout: Points = scoped.iter().map(|r| r.payout).sum();
    let wins = scoped.iter().filter(|r| r.is_win()).count() as u64;
    let win_rate = if total_games == 0 {
        0.0
    } else {
        (wins as f64 * 1000.0 / total_games as f64).round() / 10.0
    };

    StatsSummary {
        total_games,
        total_wagered,
        total_payout,
        house_profit: total_wagered - total_payout,
        win_rate,
        biggest_win: scoped.iter().map(|r| r.payout).max(),
        top_players: top_players(&scoped, options.top_players),
        recent_games: recent_games(&scoped, options.recent_games),
    }
}

/// Read a snapshot from the repository and aggregate it. Takes no user locks.
pub fn summarize<G: GameRepository + ?Sized>(
    repository: &G,
    scope: StatsScope,
    options: &StatsOptions,
) -> crate::Result<StatsSummary> {
    let records = repository.games(scope)?;
    Ok(aggregate(&records, scope, options))
}

/// Biggest total wagered first; equal totals by ascending user id.
fn top_players(records: &[&GameRecord], limit: usize) -> Vec<PlayerSummary> {
    if limit == 0 {
        return Vec::new();
    }
    let by_user = records.iter().sorted_by_key(|r| r.user_id).group_by(|r| r.user_id);
    let mut players: Vec<PlayerSummary> = by_user
        .into_iter()
        .map(|(user_id, games)| {
            let mut summary = PlayerSummary {
                user_id,
                games: 0,
                total_wagered: 0,
                total_payout: 0,
                net_profit: 0,
            };
            for game in games {
                summary.games += 1;
                summary.total_wagered += game.bet_amount;
                summary.total_payout += game.payout;
            }
            summary.net_profit = summary.total_payout - summary.total_wagered;
            summary
        })
        .collect();
    players.sort_by(|a, b| {
        b.total_wagered
            .cmp(&a.total_wagered)
            .then(a.user_id.cmp(&b.user_id))
    });
    players.truncate(limit);
    players
}

fn recent_games(records: &[&GameRecord], limit: usize) -> Vec<GameRecord> {
    records
        .iter()
        .sorted_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
        .take(limit)
        .map(|r| (*r).clone())
        .collect()
}
