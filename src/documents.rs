//! Typed shapes of the documents written to the index.
//!
//! Rows are validated by deserializing their raw JSON into these structs;
//! aggregate columns that come back as SQL `NULL` (a film without actors,
//! say) are read as empty lists.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A person linked to a film in a given role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: Uuid,
    pub name: String,
}

/// Whole film document, written by the `films` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmDocument {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub imdb_rating: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub director: Vec<PersonRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actors: Vec<PersonRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub writers: Vec<PersonRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actors_names: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub writers_names: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genre: Vec<String>,
}

/// Person fields of one film, written by the `persons` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonFilmsUpdate {
    /// Target document; not part of the merged fields.
    #[serde(skip_serializing)]
    pub film_id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub director: Vec<PersonRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actors: Vec<PersonRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub writers: Vec<PersonRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actors_names: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub writers_names: Vec<String>,
}

/// Genre names of one film, written by the `genres` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreFilmsUpdate {
    #[serde(skip_serializing)]
    pub film_id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genre: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_film_nulls_become_defaults() {
        let film: FilmDocument = serde_json::from_value(json!({
            "id": "3d825f60-9fff-4dfe-b294-1a45fa1e115d",
            "title": "Star Wars",
            "description": null,
            "imdb_rating": null,
            "director": [],
            "actors": null,
            "genre": ["Sci-Fi"],
            "updated_at": "2021-06-16T20:14:09.221855+00:00"
        }))
        .unwrap();
        assert_eq!(film.imdb_rating, 0.0);
        assert!(film.actors.is_empty());
        assert!(film.writers_names.is_empty());
        assert_eq!(film.description, None);
        assert_eq!(film.genre, vec!["Sci-Fi".to_string()]);
    }

    #[test]
    fn test_film_requires_title() {
        let result = serde_json::from_value::<FilmDocument>(json!({
            "id": "3d825f60-9fff-4dfe-b294-1a45fa1e115d",
        }));
        assert!(result.unwrap_err().to_string().contains("title"));
    }

    #[test]
    fn test_update_omits_film_id() {
        let update: GenreFilmsUpdate = serde_json::from_value(json!({
            "film_id": "3d825f60-9fff-4dfe-b294-1a45fa1e115d",
            "genre": ["Drama"],
        }))
        .unwrap();
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"genre": ["Drama"]})
        );
    }
}
