use crate::db::{ClaimStatus, CollectibleRecord, Database, LeaderboardEntry, NewCollectible};
use chrono::{DateTime, Duration, Utc};
use tracing::error;

pub const CLAIM_COOLDOWN_HOURS: i64 = 2;
const CLAIM_PREFIX: &str = "claim:";

/// Capability attached to a spawned post. Pressing its button claims the
/// collectible it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimToken {
    pub source_id: i64,
}

impl ClaimToken {
    pub fn new(source_id: i64) -> Self {
        Self { source_id }
    }

    pub fn custom_id(&self) -> String {
        format!("{CLAIM_PREFIX}{}", self.source_id)
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        custom_id
            .strip_prefix(CLAIM_PREFIX)?
            .parse()
            .ok()
            .map(Self::new)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed { claim_count: i64 },
    AlreadyClaimed { owner_name: String },
    OnCooldown { retry_at: DateTime<Utc> },
    UnknownCollectible,
    InternalError,
}

impl From<ClaimStatus> for ClaimOutcome {
    fn from(status: ClaimStatus) -> Self {
        match status {
            ClaimStatus::Claimed { claim_count } => ClaimOutcome::Claimed { claim_count },
            ClaimStatus::AlreadyClaimed { owner_name } => {
                ClaimOutcome::AlreadyClaimed { owner_name }
            }
            ClaimStatus::OnCooldown { retry_at } => ClaimOutcome::OnCooldown { retry_at },
            ClaimStatus::UnknownCollectible => ClaimOutcome::UnknownCollectible,
        }
    }
}

impl ClaimOutcome {
    /// Ephemeral reply shown to the claimer.
    pub fn message(&self) -> String {
        match self {
            ClaimOutcome::Claimed { claim_count } => format!(
                "💖 Claimed! You now own **{}** waifu{}.",
                claim_count,
                if *claim_count == 1 { "" } else { "s" }
            ),
            ClaimOutcome::AlreadyClaimed { owner_name } if owner_name.is_empty() => {
                "💔 Too slow, this waifu was already claimed.".to_string()
            }
            ClaimOutcome::AlreadyClaimed { owner_name } => {
                format!("💔 Too slow, **{}** already claimed this waifu.", owner_name)
            }
            ClaimOutcome::OnCooldown { retry_at } => format!(
                "⏳ You're on cooldown. Try again <t:{}:R>.",
                retry_at.timestamp()
            ),
            ClaimOutcome::UnknownCollectible => {
                "⚠️ This waifu is no longer available.".to_string()
            }
            ClaimOutcome::InternalError => {
                "❌ Something went wrong while claiming. Please try again.".to_string()
            }
        }
    }

    /// Whether the claim button should stop accepting presses.
    pub fn closes_claim(&self) -> bool {
        matches!(
            self,
            ClaimOutcome::Claimed { .. }
                | ClaimOutcome::AlreadyClaimed { .. }
                | ClaimOutcome::UnknownCollectible
        )
    }
}

pub struct ClaimService {
    db: Database,
    cooldown: Duration,
}

impl ClaimService {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cooldown: Duration::hours(CLAIM_COOLDOWN_HOURS),
        }
    }

    /// Register a freshly spawned collectible and hand out its claim token.
    pub async fn register_spawn(&self, item: NewCollectible) -> anyhow::Result<ClaimToken> {
        let source_id = item.source_id;
        self.db
            .run_blocking(move |db| db.upsert_collectible(&item))
            .await?;
        Ok(ClaimToken::new(source_id))
    }

    pub async fn claim(&self, user_id: u64, user_name: &str, token: ClaimToken) -> ClaimOutcome {
        self.claim_at(user_id, user_name, token, Utc::now()).await
    }

    pub async fn claim_at(
        &self,
        user_id: u64,
        user_name: &str,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> ClaimOutcome {
        let discord_id = user_id.to_string();
        let user_name = user_name.to_string();
        let cooldown = self.cooldown;
        let result = self
            .db
            .run_blocking(move |db| {
                db.claim(&discord_id, &user_name, token.source_id, now, cooldown)
            })
            .await;

        match result {
            Ok(status) => status.into(),
            Err(e) => {
                error!("Claim of {} by {} failed: {}", token.source_id, user_id, e);
                ClaimOutcome::InternalError
            }
        }
    }

    pub async fn collection(
        &self,
        user_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<CollectibleRecord>> {
        let discord_id = user_id.to_string();
        self.db
            .run_blocking(move |db| db.collection(&discord_id, limit))
            .await
    }

    pub async fn claim_count(&self, user_id: u64) -> anyhow::Result<i64> {
        let discord_id = user_id.to_string();
        let owner = self
            .db
            .run_blocking(move |db| db.get_owner(&discord_id))
            .await?;
        Ok(owner.map(|o| o.claim_count).unwrap_or(0))
    }

    pub async fn leaderboard(&self, limit: usize) -> anyhow::Result<Vec<LeaderboardEntry>> {
        self.db.run_blocking(move |db| db.leaderboard(limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> ClaimService {
        let db = Database::open_in_memory().unwrap();
        db.execute_init().unwrap();
        ClaimService::new(db)
    }

    fn spawn(source_id: i64) -> NewCollectible {
        NewCollectible {
            source_id,
            url: format!("https://cdn.example/{}.png", source_id),
            preview_url: None,
            source: None,
            artist_name: None,
            artist_url: None,
            is_nsfw: false,
            tags: vec!["waifu".to_string()],
        }
    }

    #[test]
    fn test_token_round_trip_and_rejects_foreign_ids() {
        let token = ClaimToken::new(8123);
        assert_eq!(token.custom_id(), "claim:8123");
        assert_eq!(ClaimToken::parse("claim:8123"), Some(token));
        assert_eq!(ClaimToken::parse("claim:abc"), None);
        assert_eq!(ClaimToken::parse("page:2"), None);
    }

    #[tokio::test]
    async fn test_claim_property() {
        let service = service();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let first = service.register_spawn(spawn(1)).await.unwrap();
        let second = service.register_spawn(spawn(2)).await.unwrap();

        let outcome = service.claim_at(10, "u1", first, t0).await;
        assert_eq!(outcome, ClaimOutcome::Claimed { claim_count: 1 });
        assert!(outcome.closes_claim());

        let outcome = service.claim_at(20, "u2", first, t0).await;
        assert_eq!(
            outcome,
            ClaimOutcome::AlreadyClaimed {
                owner_name: "u1".to_string()
            }
        );

        let outcome = service
            .claim_at(10, "u1", second, t0 + Duration::minutes(30))
            .await;
        assert_eq!(
            outcome,
            ClaimOutcome::OnCooldown {
                retry_at: t0 + Duration::hours(2)
            }
        );
        assert!(!outcome.closes_claim());

        let outcome = service
            .claim_at(20, "u2", ClaimToken::new(404), t0)
            .await;
        assert_eq!(outcome, ClaimOutcome::UnknownCollectible);

        assert_eq!(service.claim_count(10).await.unwrap(), 1);
        assert_eq!(service.collection(10, 25).await.unwrap().len(), 1);
    }

    #[test]
    fn test_messages_mention_retry_time() {
        let retry_at = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();
        let message = ClaimOutcome::OnCooldown { retry_at }.message();
        assert!(message.contains(&format!("<t:{}:R>", retry_at.timestamp())));
    }
}
