// ── Account domain types ──
//
// `AccountRecord` is the canonical snapshot of the logged-in account.
// Everything that observes the client (polls, websocket events) produces a
// sparse `PartialAccount`, and the account store merges it field by field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ranked queue standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub tier: String,
    pub division: String,
    pub league_points: i32,
    pub wins: u32,
    pub losses: u32,
}

/// Canonical account snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub username: String,
    pub puuid: Option<String>,
    pub summoner_id: Option<u64>,
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
    pub summoner_level: Option<u32>,
    pub profile_icon_id: Option<u32>,
    pub region: Option<String>,
    pub blue_essence: Option<u64>,
    pub riot_points: Option<u64>,
    pub solo_queue_rank: Option<RankedEntry>,
    pub flex_queue_rank: Option<RankedEntry>,
    pub champion_count: Option<u32>,
    pub skin_count: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Sparse patch: `None` means "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialAccount {
    pub username: Option<String>,
    pub puuid: Option<String>,
    pub summoner_id: Option<u64>,
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
    pub summoner_level: Option<u32>,
    pub profile_icon_id: Option<u32>,
    pub region: Option<String>,
    pub blue_essence: Option<u64>,
    pub riot_points: Option<u64>,
    pub solo_queue_rank: Option<RankedEntry>,
    pub flex_queue_rank: Option<RankedEntry>,
    pub champion_count: Option<u32>,
    pub skin_count: Option<u32>,
}

/// Copy every `Some` field of `$src` over `$dst`.
macro_rules! overlay {
    ($dst:expr, $src:expr) => {
        overlay!(
            $dst, $src;
            puuid,
            summoner_id,
            game_name,
            tag_line,
            summoner_level,
            profile_icon_id,
            region,
            blue_essence,
            riot_points,
            solo_queue_rank,
            flex_queue_rank,
            champion_count,
            skin_count
        )
    };
    ($dst:expr, $src:expr; $($field:ident),+) => {
        $(
            if let Some(value) = $src.$field {
                $dst.$field = Some(value);
            }
        )+
    };
}

impl PartialAccount {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Combine two patches; fields set in `later` win.
    pub fn and(mut self, later: PartialAccount) -> Self {
        if later.username.is_some() {
            self.username = later.username;
        }
        overlay!(self, later);
        self
    }
}

impl AccountRecord {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Apply `patch` field by field. Returns whether anything changed.
    pub fn merge(&mut self, patch: PartialAccount) -> bool {
        let before = self.clone();
        if let Some(username) = patch.username {
            self.username = username;
        }
        overlay!(self, patch);
        *self != before
    }
}

// ── Local API payloads ───────────────────────────────────────────────

/// `/lol-summoner/v1/current-summoner`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummonerPayload {
    pub puuid: Option<String>,
    pub summoner_id: Option<u64>,
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
    pub summoner_level: Option<u32>,
    pub profile_icon_id: Option<u32>,
}

impl From<SummonerPayload> for PartialAccount {
    fn from(s: SummonerPayload) -> Self {
        Self {
            puuid: s.puuid.filter(|p| !p.is_empty()),
            summoner_id: s.summoner_id,
            game_name: s.game_name.filter(|n| !n.is_empty()),
            tag_line: s.tag_line.filter(|t| !t.is_empty()),
            summoner_level: s.summoner_level,
            profile_icon_id: s.profile_icon_id,
            ..Self::default()
        }
    }
}

/// `/lol-inventory/v1/wallet`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletPayload {
    #[serde(alias = "ip")]
    pub lol_blue_essence: Option<u64>,
    #[serde(rename = "RP", alias = "rp")]
    pub riot_points: Option<u64>,
}

impl From<WalletPayload> for PartialAccount {
    fn from(w: WalletPayload) -> Self {
        Self {
            blue_essence: w.lol_blue_essence,
            riot_points: w.riot_points,
            ..Self::default()
        }
    }
}

/// `/lol-ranked/v1/current-ranked-stats`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankedPayload {
    pub queue_map: std::collections::HashMap<String, QueueStanding>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueStanding {
    pub tier: String,
    pub division: String,
    pub league_points: i32,
    pub wins: u32,
    pub losses: u32,
}

pub const SOLO_QUEUE: &str = "RANKED_SOLO_5x5";
pub const FLEX_QUEUE: &str = "RANKED_FLEX_SR";

impl QueueStanding {
    /// `None` for unranked queues.
    fn into_entry(self) -> Option<RankedEntry> {
        if self.tier.is_empty() || self.tier.eq_ignore_ascii_case("NONE") {
            return None;
        }
        Some(RankedEntry {
            tier: self.tier,
            division: self.division,
            league_points: self.league_points,
            wins: self.wins,
            losses: self.losses,
        })
    }
}

impl From<RankedPayload> for PartialAccount {
    fn from(mut r: RankedPayload) -> Self {
        Self {
            solo_queue_rank: r.queue_map.remove(SOLO_QUEUE).and_then(QueueStanding::into_entry),
            flex_queue_rank: r.queue_map.remove(FLEX_QUEUE).and_then(QueueStanding::into_entry),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_only_touches_present_fields() {
        let mut record = AccountRecord::new("testuser");
        record.blue_essence = Some(100);
        record.riot_points = Some(5);

        let changed = record.merge(PartialAccount {
            blue_essence: Some(250),
            ..PartialAccount::default()
        });

        assert!(changed);
        assert_eq!(record.blue_essence, Some(250));
        assert_eq!(record.riot_points, Some(5));
        assert_eq!(record.username, "testuser");
    }

    #[test]
    fn merging_same_values_reports_no_change() {
        let mut record = AccountRecord::new("a");
        record.summoner_level = Some(30);
        assert!(!record.merge(PartialAccount {
            summoner_level: Some(30),
            ..PartialAccount::default()
        }));
        assert!(!record.merge(PartialAccount::default()));
    }

    #[test]
    fn later_patch_wins() {
        let combined = PartialAccount {
            blue_essence: Some(1),
            riot_points: Some(2),
            ..PartialAccount::default()
        }
        .and(PartialAccount {
            blue_essence: Some(3),
            ..PartialAccount::default()
        });
        assert_eq!(combined.blue_essence, Some(3));
        assert_eq!(combined.riot_points, Some(2));
    }

    #[test]
    fn summoner_payload_to_patch() {
        let payload: SummonerPayload = serde_json::from_value(json!({
            "puuid": "p-1",
            "summonerId": 42,
            "gameName": "Tester",
            "tagLine": "EUW",
            "summonerLevel": 187,
            "profileIconId": 29,
            "displayName": "ignored"
        }))
        .expect("payload");
        let patch = PartialAccount::from(payload);
        assert_eq!(patch.game_name.as_deref(), Some("Tester"));
        assert_eq!(patch.summoner_level, Some(187));
        assert_eq!(patch.blue_essence, None);
    }

    #[test]
    fn wallet_payload_accepts_both_key_styles() {
        let new: WalletPayload =
            serde_json::from_value(json!({"lol_blue_essence": 1200, "RP": 35})).expect("wallet");
        let old: WalletPayload = serde_json::from_value(json!({"ip": 7, "rp": 9})).expect("wallet");
        assert_eq!(PartialAccount::from(new).blue_essence, Some(1200));
        assert_eq!(PartialAccount::from(old).riot_points, Some(9));
    }

    #[test]
    fn ranked_payload_skips_unranked_queues() {
        let payload: RankedPayload = serde_json::from_value(json!({
            "queueMap": {
                "RANKED_SOLO_5x5": {"tier": "GOLD", "division": "II", "leaguePoints": 55, "wins": 10, "losses": 8},
                "RANKED_FLEX_SR": {"tier": "NONE", "division": "NA"}
            }
        }))
        .expect("ranked");
        let patch = PartialAccount::from(payload);
        assert_eq!(
            patch.solo_queue_rank,
            Some(RankedEntry {
                tier: "GOLD".into(),
                division: "II".into(),
                league_points: 55,
                wins: 10,
                losses: 8,
            })
        );
        assert_eq!(patch.flex_queue_rank, None);
    }
}
