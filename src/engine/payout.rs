//! Pot split for a finished battle.

use crate::domain::{AccountId, Battle, SettlementOutcome};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Who gets paid what when a battle settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutPlan {
    pub outcome: SettlementOutcome,
    /// Amount credited to each receiving artist.
    pub artist_payout: i64,
    pub artist_credits: Vec<(AccountId, i64)>,
    pub platform_share: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayoutError {
    #[error("team {0} has no artist to pay")]
    MissingArtist(&'static str),
    #[error("winner share {0} is outside [0, 1]")]
    InvalidShare(Decimal),
}

/// Split `battle.total_pot` from the final team scores.
///
/// The winning artist receives `floor(pot × winner_share)`. On an exact tie
/// that amount is halved between both artists. Whatever is left (including
/// rounding dust) is the platform's share.
pub fn plan_payout(battle: &Battle, winner_share: Decimal) -> Result<PayoutPlan, PayoutError> {
    if winner_share < Decimal::ZERO || winner_share > Decimal::ONE {
        return Err(PayoutError::InvalidShare(winner_share));
    }

    let outcome = SettlementOutcome::from_scores(battle.team_a.score, battle.team_b.score);
    let pot = battle.total_pot.max(0);
    let winner_total = (Decimal::from(pot) * winner_share)
        .floor()
        .to_i64()
        .unwrap_or(0)
        .clamp(0, pot);

    let artist_a = battle.team_a.artist_id.clone();
    let artist_b = battle.team_b.artist_id.clone();

    let (artist_payout, recipients) = match outcome {
        SettlementOutcome::TeamA => (
            winner_total,
            vec![artist_a.ok_or(PayoutError::MissingArtist("A"))?],
        ),
        SettlementOutcome::TeamB => (
            winner_total,
            vec![artist_b.ok_or(PayoutError::MissingArtist("B"))?],
        ),
        SettlementOutcome::Tie => (
            winner_total / 2,
            vec![
                artist_a.ok_or(PayoutError::MissingArtist("A"))?,
                artist_b.ok_or(PayoutError::MissingArtist("B"))?,
            ],
        ),
    };

    let artist_credits: Vec<(AccountId, i64)> = if artist_payout > 0 {
        recipients.into_iter().map(|a| (a, artist_payout)).collect()
    } else {
        Vec::new()
    };
    let paid: i64 = artist_credits.iter().map(|(_, amount)| amount).sum();

    Ok(PayoutPlan {
        outcome,
        artist_payout,
        artist_credits,
        platform_share: pot - paid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BattleId, BattleStatus, Team, TeamSide, TimeMs};
    use std::str::FromStr;

    fn battle(pot: i64, score_a: i64, score_b: i64) -> Battle {
        Battle {
            id: BattleId::new("b1"),
            name: "Clash".to_string(),
            creator_id: AccountId::new("artist-a"),
            duration_secs: 60,
            entry_fee: pot / 2,
            status: BattleStatus::Completed,
            created_at: TimeMs::new(0),
            scheduled_at: None,
            started_at: Some(TimeMs::new(0)),
            ended_at: Some(TimeMs::new(60_000)),
            songs: vec![],
            team_a: Team {
                side: TeamSide::A,
                name: "A".to_string(),
                artist_id: Some(AccountId::new("artist-a")),
                score: score_a,
                supporters: 0,
            },
            team_b: Team {
                side: TeamSide::B,
                name: "B".to_string(),
                artist_id: Some(AccountId::new("artist-b")),
                score: score_b,
                supporters: 0,
            },
            total_pot: pot,
            stream_revenue: 0,
            cancel_reason: None,
        }
    }

    fn share() -> Decimal {
        Decimal::from_str("0.70").unwrap()
    }

    #[test]
    fn test_winner_takes_seventy_percent() {
        let plan = plan_payout(&battle(2000, 150, 80), share()).unwrap();
        assert_eq!(plan.outcome, SettlementOutcome::TeamA);
        assert_eq!(plan.artist_credits, vec![(AccountId::new("artist-a"), 1400)]);
        assert_eq!(plan.platform_share, 600);
    }

    #[test]
    fn test_tie_splits_winner_share() {
        let plan = plan_payout(&battle(2000, 50, 50), share()).unwrap();
        assert_eq!(plan.outcome, SettlementOutcome::Tie);
        assert_eq!(
            plan.artist_credits,
            vec![
                (AccountId::new("artist-a"), 700),
                (AccountId::new("artist-b"), 700)
            ]
        );
        assert_eq!(plan.platform_share, 600);
    }

    #[test]
    fn test_rounding_dust_goes_to_platform() {
        let plan = plan_payout(&battle(3, 0, 0), share()).unwrap();
        // floor(3 * 0.7) = 2, halved = 1 each
        assert_eq!(plan.artist_payout, 1);
        assert_eq!(plan.platform_share, 1);
    }

    #[test]
    fn test_free_battle_pays_nothing() {
        let plan = plan_payout(&battle(0, 10, 0), share()).unwrap();
        assert!(plan.artist_credits.is_empty());
        assert_eq!(plan.platform_share, 0);
    }

    #[test]
    fn test_missing_artist() {
        let mut b = battle(2000, 0, 10);
        b.team_b.artist_id = None;
        assert_eq!(
            plan_payout(&b, share()).unwrap_err(),
            PayoutError::MissingArtist("B")
        );
    }
}
