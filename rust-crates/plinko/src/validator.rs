use crate::{
    Points,
    Rejection,
    settings::GameSettings,
};

/// Check every precondition of a play. The first failing check wins:
/// enabled, bet bounds, balance, then the daily limit.
pub fn validate(
    balance: Points,
    bet: Points,
    today_game_count: u32,
    settings: &GameSettings,
) -> Result<(), Rejection> {
    if !settings.enabled {
        return Err(Rejection::GameDisabled);
    }
    if bet <= 0 || bet < settings.min_bet || bet > settings.max_bet {
        return Err(Rejection::InvalidBetAmount {
            min: settings.min_bet,
            max: settings.max_bet,
        });
    }
    if balance < bet {
        return Err(Rejection::InsufficientBalance { balance, bet });
    }
    if today_game_count >= settings.daily_limit {
        return Err(Rejection::DailyLimitReached {
            limit: settings.daily_limit,
        });
    }
    Ok(())
}
