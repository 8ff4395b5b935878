//! Independently checkpointed change streams.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a part name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown part '{0}': expected one of films, persons, genres")]
pub struct UnknownPartError(pub String);

/// A named change stream that advances its own watermark.
///
/// `Films` is the root part: its rows are whole film documents. `Persons` and
/// `Genres` are dependent parts: a change to a linked entity (a person or a
/// genre) causes partial updates of every film document linked to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Films,
    Persons,
    Genres,
}

/// The relationship a dependent part follows from linked entity to film.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `content.person` via `content.person_film_work`
    Persons,
    /// `content.genre` via `content.genre_film_work`
    Genres,
}

impl Part {
    /// Every supported part, in the order a full run processes them.
    pub const ALL: [Part; 3] = [Part::Films, Part::Persons, Part::Genres];

    /// The reduced set used to bootstrap an empty index.
    pub const INITIAL: [Part; 1] = [Part::Films];

    pub fn as_str(&self) -> &'static str {
        match self {
            Part::Films => "films",
            Part::Persons => "persons",
            Part::Genres => "genres",
        }
    }

    /// Checkpoint key of the part's primary cursor.
    ///
    /// For the root part this tracks film changes; for dependent parts it
    /// tracks changes of the linked entity.
    pub fn cursor_key(&self) -> &'static str {
        self.as_str()
    }

    /// Checkpoint key of the owner-scan cursor of a dependent part.
    pub fn owner_cursor_key(&self) -> Option<&'static str> {
        self.relation().map(|relation| relation.owner_cursor_key())
    }

    /// The relationship followed by a dependent part, `None` for the root part.
    pub fn relation(&self) -> Option<Relation> {
        match self {
            Part::Films => None,
            Part::Persons => Some(Relation::Persons),
            Part::Genres => Some(Relation::Genres),
        }
    }
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        self.part().as_str()
    }

    /// The dependent part that follows this relationship.
    pub fn part(&self) -> Part {
        match self {
            Relation::Persons => Part::Persons,
            Relation::Genres => Part::Genres,
        }
    }

    pub fn owner_cursor_key(&self) -> &'static str {
        match self {
            Relation::Persons => "persons_film",
            Relation::Genres => "genres_film",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Part {
    type Err = UnknownPartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "films" => Ok(Part::Films),
            "persons" => Ok(Part::Persons),
            "genres" => Ok(Part::Genres),
            other => Err(UnknownPartError(other.to_string())),
        }
    }
}
