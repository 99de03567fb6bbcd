/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS Species (
    species_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    homeworld TEXT,
    warp_capable INTEGER
);

CREATE TABLE IF NOT EXISTS Organizations (
    organization_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    type TEXT
);

CREATE TABLE IF NOT EXISTS Actors (
    actor_id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL DEFAULT '',
    birth_date TEXT,
    birth_place TEXT,
    UNIQUE (first_name, last_name)
);

CREATE INDEX IF NOT EXISTS idx_actors_name ON Actors(last_name, first_name);

CREATE TABLE IF NOT EXISTS Series (
    series_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    abbreviation TEXT,
    start_year INTEGER,
    end_year INTEGER,
    num_seasons INTEGER,
    num_episodes INTEGER
);

-- Enrichment columns (imdb_id, imdb_rating, ...) are added on demand by
-- the episode import.
CREATE TABLE IF NOT EXISTS Episodes (
    episode_id INTEGER PRIMARY KEY AUTOINCREMENT,
    series_id INTEGER NOT NULL REFERENCES Series(series_id),
    title TEXT NOT NULL,
    season INTEGER NOT NULL,
    episode_number INTEGER NOT NULL,
    air_date TEXT,
    UNIQUE (series_id, season, episode_number)
);

CREATE TABLE IF NOT EXISTS Ships (
    ship_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    registry TEXT,
    class TEXT,
    organization_id INTEGER REFERENCES Organizations(organization_id),
    type TEXT,
    launched_year INTEGER
);

CREATE INDEX IF NOT EXISTS idx_ships_name ON Ships(name);

-- primary_actor_id is added on demand by the cast pass.
CREATE TABLE IF NOT EXISTS Characters (
    character_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    species_id INTEGER REFERENCES Species(species_id),
    gender TEXT,
    rank TEXT,
    title TEXT,
    occupation TEXT,
    birth_year INTEGER,
    death_year INTEGER
);

CREATE TABLE IF NOT EXISTS Character_Actors (
    character_actor_id INTEGER PRIMARY KEY AUTOINCREMENT,
    character_id INTEGER NOT NULL REFERENCES Characters(character_id) ON DELETE CASCADE,
    actor_id INTEGER NOT NULL REFERENCES Actors(actor_id) ON DELETE CASCADE,
    series TEXT,
    first_appearance TEXT,
    last_appearance TEXT,
    episodes_count INTEGER
);

-- One row per (character, actor, series); a missing series counts as one
-- value so only a single placeholder row can exist per pair.
CREATE UNIQUE INDEX IF NOT EXISTS idx_character_actors_key
    ON Character_Actors(character_id, actor_id, IFNULL(series, ''));
CREATE INDEX IF NOT EXISTS idx_character_actors_actor ON Character_Actors(actor_id);

CREATE TABLE IF NOT EXISTS Character_Episodes (
    character_id INTEGER NOT NULL REFERENCES Characters(character_id) ON DELETE CASCADE,
    episode_id INTEGER NOT NULL REFERENCES Episodes(episode_id) ON DELETE CASCADE,
    PRIMARY KEY (character_id, episode_id)
);

CREATE TABLE IF NOT EXISTS Character_Organizations (
    character_id INTEGER NOT NULL REFERENCES Characters(character_id) ON DELETE CASCADE,
    organization_id INTEGER NOT NULL REFERENCES Organizations(organization_id) ON DELETE CASCADE,
    role TEXT,
    PRIMARY KEY (character_id, organization_id)
);

CREATE TABLE IF NOT EXISTS Character_Ships (
    character_id INTEGER NOT NULL REFERENCES Characters(character_id) ON DELETE CASCADE,
    ship_id INTEGER NOT NULL REFERENCES Ships(ship_id) ON DELETE CASCADE,
    role TEXT,
    PRIMARY KEY (character_id, ship_id)
);
"#;

/// All migrations in order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];

/// Data tables in dependency order, for status reports.
pub const TABLES: &[&str] = &[
    "Species",
    "Organizations",
    "Actors",
    "Series",
    "Episodes",
    "Ships",
    "Characters",
    "Character_Actors",
    "Character_Episodes",
    "Character_Organizations",
    "Character_Ships",
];
