use crate::backend::AdminBackend;
use chrono::Local;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use plinko::{
    Points,
    settings::SettingKey,
    stats::{
        StatsOptions,
        StatsSummary,
    },
};
use std::io::Write;

pub async fn stats(
    backend: &impl AdminBackend,
    options: &StatsOptions,
    out: &mut impl Write,
) -> Result<()> {
    let summary = backend
        .summary(options)
        .await
        .wrap_err("summarizing games")?;
    write_summary(&summary, out)?;
    Ok(())
}

fn write_summary(summary: &StatsSummary, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "=== PLINKO STATS ===")?;
    writeln!(out, "Total Games: {}", summary.total_games)?;
    writeln!(out, "Total Wagered: {} points", summary.total_wagered)?;
    writeln!(out, "Total Payout: {} points", summary.total_payout)?;
    writeln!(out, "House Profit: {} points", summary.house_profit)?;
    writeln!(out, "Win Rate: {:.1}%", summary.win_rate)?;
    match summary.biggest_win {
        Some(win) => writeln!(out, "Biggest Win: {win} points")?,
        None => writeln!(out, "Biggest Win: -")?,
    }

    if !summary.recent_games.is_empty() {
        writeln!(out)?;
        writeln!(out, "Recent games:")?;
        for game in &summary.recent_games {
            writeln!(
                out,
                "  #{:<5} user {:<5} bet {:>4} slot {} {:>4} payout {:>5}  {}",
                game.id,
                game.user_id,
                game.bet_amount,
                game.slot_hit,
                game.multiplier.to_string(),
                game.payout,
                game.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            )?;
        }
    }

    if !summary.top_players.is_empty() {
        writeln!(out)?;
        writeln!(out, "Top players:")?;
        for (rank, player) in summary.top_players.iter().enumerate() {
            writeln!(
                out,
                "  {}. user {} wagered {} over {} games (net {:+})",
                rank + 1,
                player.user_id,
                player.total_wagered,
                player.games,
                player.net_profit,
            )?;
        }
    }
    Ok(())
}

/// With no key, print every setting; with a key alone, print it; with both,
/// coerce and store the value.
pub async fn config(
    backend: &impl AdminBackend,
    key: Option<&str>,
    value: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    match (key, value) {
        (None, _) => {
            let settings = backend.settings().await?;
            for key in SettingKey::ALL {
                writeln!(out, "{key} = {}", settings.value_of(key))?;
            }
        }
        (Some(key), None) => {
            let key: SettingKey = key.parse()?;
            let settings = backend.settings().await?;
            writeln!(out, "{key} = {}", settings.value_of(key))?;
        }
        (Some(key), Some(value)) => {
            let updated = backend.update_setting(key, value).await?;
            let key: SettingKey = key.parse()?;
            writeln!(out, "Updated {key} to {}", updated.value_of(key))?;
        }
    }
    Ok(())
}

pub async fn points(
    backend: &impl AdminBackend,
    username: &str,
    amount: Points,
    out: &mut impl Write,
) -> Result<()> {
    let account = backend.adjust_points(username, amount).await?;
    writeln!(
        out,
        "Added {amount} points to {username}. New balance: {}",
        account.balance
    )?;
    Ok(())
}

pub async fn register(
    backend: &impl AdminBackend,
    username: &str,
    balance: Points,
    out: &mut impl Write,
) -> Result<()> {
    let account = backend.register(username, balance).await?;
    writeln!(
        out,
        "Registered {} as user {} with {} points",
        account.username, account.id, account.balance
    )?;
    Ok(())
}
