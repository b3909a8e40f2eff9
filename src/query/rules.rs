//! Declarative rule sets, as stored by smart playlists and passed as browse
//! filters, and their translation into predicates.

use super::options::{EntityKind, SortSpec};
use super::predicate::{escape_like, CompareOp, Predicate};
use chrono::{Duration, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// Longest "in the last N days" window accepted.
const MAX_DAYS: i64 = 36_500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Title,
    Artist,
    AlbumArtist,
    Album,
    Genre,
    Year,
    Rating,
    UserRating,
    PlayCount,
    LastPlayed,
    DateAdded,
    Duration,
    Comment,
    Path,
    Compilation,
    Label,
    ReleaseType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    /// Values are a number of days.
    InTheLast,
    True,
    False,
}

impl RuleOperator {
    fn is_negated(&self) -> bool {
        matches!(self, RuleOperator::IsNot | RuleOperator::DoesNotContain)
    }

    fn positive(&self) -> RuleOperator {
        match self {
            RuleOperator::IsNot => RuleOperator::Is,
            RuleOperator::DoesNotContain => RuleOperator::Contains,
            other => *other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub field: RuleField,
    pub operator: RuleOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Rule {
    pub fn new(field: RuleField, operator: RuleOperator, values: &[&str]) -> Self {
        Self {
            field,
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

fn default_match_all() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub kind: EntityKind,
    /// `true` joins the rules with AND, `false` with OR.
    #[serde(default = "default_match_all")]
    pub match_all: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl RuleSet {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            match_all: true,
            rules: Vec::new(),
            sort: None,
            limit: None,
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Predicate over [`EntityKind::table`] of the rule set's own kind.
    /// Rules whose field does not exist for that kind are skipped.
    pub fn predicate(&self) -> Predicate {
        let parts = self
            .rules
            .iter()
            .filter_map(|rule| rule_predicate(self.kind, rule));
        if self.match_all {
            Predicate::all(parts)
        } else {
            let parts: Vec<Predicate> = parts.collect();
            if parts.is_empty() {
                Predicate::Always
            } else {
                Predicate::any(parts)
            }
        }
    }
}

// =============================================================================
// Field resolution
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueKind {
    Text,
    Number,
    Date,
    Bool,
}

/// Where a rule field lives for a given entity kind.
enum Target {
    Column(&'static str, ValueKind),
    /// A text column reached through a correlated sub-query.
    Related {
        from: &'static str,
        correlation: &'static str,
        column: &'static str,
    },
}

const SONG_ARTISTS: &str = "artist_credit JOIN artist ON artist.artist_id = artist_credit.artist_id";
const SONG_GENRES: &str = "song_genre JOIN genre ON genre.genre_id = song_genre.genre_id";
const ALBUM_GENRES: &str = "album_genre JOIN genre ON genre.genre_id = album_genre.genre_id";

fn song_target(field: RuleField) -> Option<Target> {
    use ValueKind::*;
    let target = match field {
        RuleField::Title => Target::Column("song_view.title", Text),
        RuleField::Artist => Target::Related {
            from: SONG_ARTISTS,
            correlation: "artist_credit.owner_kind = 'song' \
                          AND artist_credit.owner_id = song_view.song_id",
            column: "artist.name",
        },
        RuleField::AlbumArtist => Target::Related {
            from: SONG_ARTISTS,
            correlation: "artist_credit.owner_kind = 'album' \
                          AND artist_credit.owner_id = song_view.album_id",
            column: "artist.name",
        },
        RuleField::Album => Target::Column("song_view.album_title", Text),
        RuleField::Genre => Target::Related {
            from: SONG_GENRES,
            correlation: "song_genre.song_id = song_view.song_id",
            column: "genre.name",
        },
        RuleField::Year => Target::Column("song_view.year", Number),
        RuleField::Rating => Target::Column("song_view.rating", Number),
        RuleField::UserRating => Target::Column("song_view.user_rating", Number),
        RuleField::PlayCount => Target::Column("song_view.play_count", Number),
        RuleField::LastPlayed => Target::Column("song_view.last_played", Date),
        RuleField::DateAdded => Target::Column("song_view.date_added", Date),
        RuleField::Duration => Target::Column("song_view.duration", Number),
        RuleField::Comment => Target::Column("song_view.comment", Text),
        RuleField::Path => Target::Column("song_view.full_path", Text),
        RuleField::Compilation => Target::Column("song_view.compilation", Bool),
        RuleField::ReleaseType => Target::Column("song_view.release_type", Text),
        RuleField::Label => return None,
    };
    Some(target)
}

fn album_target(field: RuleField) -> Option<Target> {
    use ValueKind::*;
    let target = match field {
        RuleField::Title | RuleField::Album => Target::Column("album_view.title", Text),
        RuleField::Artist | RuleField::AlbumArtist => Target::Related {
            from: SONG_ARTISTS,
            correlation: "artist_credit.owner_kind = 'album' \
                          AND artist_credit.owner_id = album_view.album_id",
            column: "artist.name",
        },
        RuleField::Genre => Target::Related {
            from: ALBUM_GENRES,
            correlation: "album_genre.album_id = album_view.album_id",
            column: "genre.name",
        },
        RuleField::Path => Target::Related {
            from: "song JOIN file ON file.file_id = song.file_id \
                   JOIN path ON path.path_id = file.path_id",
            correlation: "song.album_id = album_view.album_id",
            column: "path.path || file.filename",
        },
        RuleField::Year => Target::Column("album_view.year", Number),
        RuleField::Rating => Target::Column("album_view.rating", Number),
        RuleField::UserRating => Target::Column("album_view.user_rating", Number),
        RuleField::PlayCount => Target::Column("album_view.play_count", Number),
        RuleField::LastPlayed => Target::Column("album_view.last_played", Date),
        RuleField::DateAdded => Target::Column("album_view.date_added", Date),
        RuleField::Duration => Target::Column("album_view.total_duration", Number),
        RuleField::Compilation => Target::Column("album_view.compilation", Bool),
        RuleField::Label => Target::Column("album_view.label", Text),
        RuleField::ReleaseType => Target::Column("album_view.release_type", Text),
        RuleField::Comment => return None,
    };
    Some(target)
}

fn artist_target(field: RuleField) -> Option<Target> {
    let target = match field {
        RuleField::Title | RuleField::Artist | RuleField::AlbumArtist => {
            Target::Column("artist_view.name", ValueKind::Text)
        }
        RuleField::Genre => Target::Related {
            from: "artist_credit JOIN song_genre ON artist_credit.owner_kind = 'song' \
                   AND song_genre.song_id = artist_credit.owner_id \
                   JOIN genre ON genre.genre_id = song_genre.genre_id",
            correlation: "artist_credit.artist_id = artist_view.artist_id",
            column: "genre.name",
        },
        RuleField::Album => Target::Related {
            from: "artist_credit JOIN album ON artist_credit.owner_kind = 'album' \
                   AND album.album_id = artist_credit.owner_id",
            correlation: "artist_credit.artist_id = artist_view.artist_id",
            column: "album.title",
        },
        _ => return None,
    };
    Some(target)
}

fn target_for(kind: EntityKind, field: RuleField) -> Option<Target> {
    match kind {
        EntityKind::Songs => song_target(field),
        EntityKind::Albums => album_target(field),
        EntityKind::Artists => artist_target(field),
        EntityKind::Genres => match field {
            RuleField::Title | RuleField::Genre => {
                Some(Target::Column("genre.name", ValueKind::Text))
            }
            _ => None,
        },
        EntityKind::Playlists => match field {
            RuleField::Title => Some(Target::Column("playlist.name", ValueKind::Text)),
            _ => None,
        },
    }
}

// =============================================================================
// Operators
// =============================================================================

fn number_value(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .map(Value::Integer)
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(Value::Real))
}

fn days_ago(raw: &str) -> Option<Value> {
    let days = raw.trim().parse::<i64>().ok()?.clamp(0, MAX_DAYS);
    let since = Utc::now() - Duration::days(days);
    Some(Value::Text(since.format("%Y-%m-%d %H:%M:%S").to_string()))
}

/// Predicate for one value under a non-negated operator.
fn value_predicate(column: &str, kind: ValueKind, op: RuleOperator, raw: &str) -> Option<Predicate> {
    let text = |pattern: String| Some(Predicate::like(column, pattern));
    match (op, kind) {
        (RuleOperator::Is, ValueKind::Text) => text(escape_like(raw)),
        (RuleOperator::Contains, ValueKind::Text) => text(format!("%{}%", escape_like(raw))),
        (RuleOperator::StartsWith, ValueKind::Text) => text(format!("{}%", escape_like(raw))),
        (RuleOperator::EndsWith, ValueKind::Text) => text(format!("%{}", escape_like(raw))),
        (RuleOperator::Is, ValueKind::Number) => Some(Predicate::eq(column, number_value(raw)?)),
        (RuleOperator::GreaterThan, ValueKind::Number) => Some(Predicate::compare(
            column,
            CompareOp::Gt,
            number_value(raw)?,
        )),
        (RuleOperator::LessThan, ValueKind::Number) => Some(Predicate::compare(
            column,
            CompareOp::Lt,
            number_value(raw)?,
        )),
        (RuleOperator::Is, ValueKind::Date) => text(format!("{}%", escape_like(raw.trim()))),
        (RuleOperator::GreaterThan, ValueKind::Date) => Some(Predicate::compare(
            column,
            CompareOp::Gt,
            raw.trim().to_string(),
        )),
        (RuleOperator::LessThan, ValueKind::Date) => Some(Predicate::compare(
            column,
            CompareOp::Lt,
            raw.trim().to_string(),
        )),
        (RuleOperator::InTheLast, ValueKind::Date) => {
            Some(Predicate::compare(column, CompareOp::Ge, days_ago(raw)?))
        }
        _ => None,
    }
}

/// OR of the value predicates, or `None` when no value could be used.
fn values_predicate(column: &str, kind: ValueKind, op: RuleOperator, values: &[String]) -> Option<Predicate> {
    let parts: Vec<Predicate> = values
        .iter()
        .filter_map(|raw| value_predicate(column, kind, op, raw))
        .collect();
    (!parts.is_empty()).then(|| Predicate::any(parts))
}

fn rule_predicate(kind: EntityKind, rule: &Rule) -> Option<Predicate> {
    let op = rule.operator.positive();
    let predicate = match target_for(kind, rule.field)? {
        Target::Column(column, ValueKind::Bool) => match rule.operator {
            RuleOperator::True => Predicate::eq(column, 1i64),
            RuleOperator::False => Predicate::eq(column, 0i64),
            _ => return None,
        },
        Target::Column(column, value_kind) => {
            let matched = values_predicate(column, value_kind, op, &rule.values)?;
            if rule.operator.is_negated() {
                // A missing value never equals nor contains anything
                Predicate::IsNull(column.to_string()).or(matched.not())
            } else {
                matched
            }
        }
        Target::Related {
            from,
            correlation,
            column,
        } => {
            let matched = values_predicate(column, ValueKind::Text, op, &rule.values)?;
            let exists = Predicate::exists(from, correlation, matched);
            if rule.operator.is_negated() {
                exists.not()
            } else {
                exists
            }
        }
    };
    Some(predicate)
}
