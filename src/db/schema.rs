/// Collectibles are keyed by the provider's image id. A claim row is unique
/// per collectible, which is what makes a collectible claimable only once.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS owners (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        discord_id TEXT NOT NULL UNIQUE,
        user_name TEXT NOT NULL,
        claim_count INTEGER NOT NULL DEFAULT 0,
        last_claimed_at DATETIME,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS collectibles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER NOT NULL UNIQUE,
        url TEXT NOT NULL,
        preview_url TEXT,
        source TEXT,
        artist_name TEXT,
        artist_url TEXT,
        is_nsfw BOOLEAN NOT NULL DEFAULT FALSE,
        tags TEXT NOT NULL DEFAULT '',
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS claims (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL REFERENCES owners (id),
        collectible_id INTEGER NOT NULL UNIQUE REFERENCES collectibles (id),
        claimed_at DATETIME NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_claims_owner ON claims (owner_id);
";
