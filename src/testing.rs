//! In-memory collaborators for tests.
//!
//! [`ScriptedSource`] models the movies catalogue as plain vectors and answers
//! the change queries the way the PostgreSQL source does, including keyset
//! paging, so pipeline behavior can be tested without a database. The sink
//! and checkpoint counterparts are [`MemorySink`] and [`MemoryStore`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sync_core::{Cursor, QueryError, Relation, RowSource, Scan, ScanPosition, SourceRow};

pub use checkpoint::MemoryStore;
pub use index_sink::MemorySink;

/// Parse a cursor literal; panics on invalid input.
pub fn ts(s: &str) -> Cursor {
    match Cursor::parse(s) {
        Ok(cursor) => cursor,
        Err(e) => panic!("invalid test cursor {s:?}: {e}"),
    }
}

/// A deterministic film id.
pub fn uuid(n: u128) -> String {
    uuid::Uuid::from_u128(n).to_string()
}

/// Raw columns of a film without persons or genres.
pub fn film_data(id: &str, title: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("id".to_string(), json!(id));
    data.insert("title".to_string(), json!(title));
    data.insert("description".to_string(), Value::Null);
    data.insert("imdb_rating".to_string(), Value::Null);
    data.insert("director".to_string(), json!([]));
    for column in ["actors", "writers", "actors_names", "writers_names", "genre"] {
        data.insert(column.to_string(), Value::Null);
    }
    data
}

#[derive(Debug, Clone)]
struct Film {
    id: String,
    changed_at: Cursor,
    title: String,
}

#[derive(Debug, Clone)]
struct Linked {
    id: String,
    changed_at: Cursor,
    name: String,
    film_ids: Vec<String>,
}

/// Scriptable [`RowSource`].
///
/// Persons are linked to films as actors, and person and genre ids end up in
/// documents, so like film ids they must be UUIDs. Every query is recorded by name
/// (`films`, `persons`, `persons_film`, `person_films` and the genre
/// equivalents) so tests can assert what was fetched.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    films: Vec<Film>,
    persons: Vec<Linked>,
    genres: Vec<Linked>,
    queries: Vec<String>,
    failing_queries: usize,
}

fn is_after(position: &ScanPosition, changed_at: Cursor, id: &str) -> bool {
    changed_at > position.after
        || (changed_at == position.after
            && position.after_id.as_deref().is_some_and(|after| id > after))
}

fn page(mut rows: Vec<SourceRow>, position: &ScanPosition, limit: usize) -> Vec<SourceRow> {
    rows.retain(|row| is_after(position, row.changed_at, &row.id));
    rows.sort_by(|a, b| (a.changed_at, &a.id).cmp(&(b.changed_at, &b.id)));
    rows.truncate(limit);
    rows
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_film(&mut self, id: &str, changed_at: Cursor, title: &str) {
        self.films.push(Film {
            id: id.to_string(),
            changed_at,
            title: title.to_string(),
        });
    }

    pub fn add_person(&mut self, id: &str, changed_at: Cursor, name: &str, film_ids: &[&str]) {
        self.persons.push(new_linked(id, changed_at, name, film_ids));
    }

    pub fn add_genre(&mut self, id: &str, changed_at: Cursor, name: &str, film_ids: &[&str]) {
        self.genres.push(new_linked(id, changed_at, name, film_ids));
    }

    /// Rename a film and move its timestamp, as an edit would.
    pub fn update_film(&mut self, id: &str, changed_at: Cursor, title: &str) {
        for film in self.films.iter_mut().filter(|f| f.id == id) {
            film.changed_at = changed_at;
            film.title = title.to_string();
        }
    }

    /// Rename a person or genre and move its timestamp.
    pub fn update_linked(&mut self, relation: Relation, id: &str, changed_at: Cursor, name: &str) {
        for entity in self.linked_mut(relation).iter_mut().filter(|l| l.id == id) {
            entity.changed_at = changed_at;
            entity.name = name.to_string();
        }
    }

    /// Make the next `n` queries fail with a [`QueryError`].
    pub fn fail_next_queries(&mut self, n: usize) {
        self.failing_queries = n;
    }

    /// Names of the queries issued so far, in order.
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn clear_queries(&mut self) {
        self.queries.clear();
    }

    fn linked(&self, relation: Relation) -> &[Linked] {
        match relation {
            Relation::Persons => &self.persons,
            Relation::Genres => &self.genres,
        }
    }

    fn linked_mut(&mut self, relation: Relation) -> &mut Vec<Linked> {
        match relation {
            Relation::Persons => &mut self.persons,
            Relation::Genres => &mut self.genres,
        }
    }

    fn record(&mut self, query: &str) -> Result<()> {
        self.queries.push(query.to_string());
        if self.failing_queries > 0 {
            self.failing_queries -= 1;
            return Err(QueryError::new(query, "connection reset by peer").into());
        }
        Ok(())
    }

    fn linked_to(&self, relation: Relation, film_id: &str) -> Vec<&Linked> {
        let mut linked: Vec<&Linked> = self
            .linked(relation)
            .iter()
            .filter(|l| l.film_ids.iter().any(|id| id == film_id))
            .collect();
        linked.sort_by(|a, b| a.name.cmp(&b.name));
        linked
    }

    fn person_columns(&self, film_id: &str, data: &mut Map<String, Value>) {
        let actors = self.linked_to(Relation::Persons, film_id);
        if actors.is_empty() {
            return;
        }
        data.insert(
            "actors".to_string(),
            actors
                .iter()
                .map(|p| json!({"id": p.id, "name": p.name}))
                .collect(),
        );
        data.insert(
            "actors_names".to_string(),
            actors.iter().map(|p| json!(p.name)).collect(),
        );
    }

    fn genre_columns(&self, film_id: &str, data: &mut Map<String, Value>) {
        let genres = self.linked_to(Relation::Genres, film_id);
        if !genres.is_empty() {
            data.insert(
                "genre".to_string(),
                genres.iter().map(|g| json!(g.name)).collect(),
            );
        }
    }

    fn film_row(&self, film: &Film) -> SourceRow {
        let mut data = film_data(&film.id, &film.title);
        self.person_columns(&film.id, &mut data);
        self.genre_columns(&film.id, &mut data);
        SourceRow::new(film.id.clone(), film.changed_at, data)
    }

    fn owners(&self, relation: Relation, linked_ids: &[String]) -> Vec<SourceRow> {
        self.films
            .iter()
            .filter(|film| {
                self.linked(relation).iter().any(|l| {
                    linked_ids.contains(&l.id)
                        && l.film_ids.contains(&film.id)
                        && l.changed_at > film.changed_at
                })
            })
            .map(|film| SourceRow::key(film.id.clone(), film.changed_at))
            .collect()
    }
}

fn new_linked(id: &str, changed_at: Cursor, name: &str, film_ids: &[&str]) -> Linked {
    Linked {
        id: id.to_string(),
        changed_at,
        name: name.to_string(),
        film_ids: film_ids.iter().map(|id| id.to_string()).collect(),
    }
}

#[async_trait]
impl RowSource for ScriptedSource {
    async fn changed_since(
        &mut self,
        scan: Scan<'_>,
        position: &ScanPosition,
        limit: usize,
    ) -> Result<Vec<SourceRow>> {
        let (name, rows): (String, Vec<SourceRow>) = match scan {
            Scan::Root => (
                "films".to_string(),
                self.films.iter().map(|f| self.film_row(f)).collect(),
            ),
            Scan::Linked(relation) => (
                relation.as_str().to_string(),
                self.linked(relation)
                    .iter()
                    .map(|l| SourceRow::key(l.id.clone(), l.changed_at))
                    .collect(),
            ),
            Scan::Owners {
                relation,
                linked_ids,
            } => (
                relation.owner_cursor_key().to_string(),
                self.owners(relation, linked_ids),
            ),
        };
        self.record(&name)?;
        Ok(page(rows, position, limit))
    }

    async fn rows_by_id(&mut self, relation: Relation, ids: &[String]) -> Result<Vec<SourceRow>> {
        let name = match relation {
            Relation::Persons => "person_films",
            Relation::Genres => "genre_films",
        };
        self.record(name)?;

        let mut films: Vec<&Film> = self.films.iter().filter(|f| ids.contains(&f.id)).collect();
        films.sort_by(|a, b| (a.changed_at, &a.id).cmp(&(b.changed_at, &b.id)));
        Ok(films
            .into_iter()
            .map(|film| {
                let mut data = Map::new();
                data.insert("film_id".to_string(), json!(film.id));
                match relation {
                    Relation::Persons => {
                        data.insert("director".to_string(), json!([]));
                        self.person_columns(&film.id, &mut data);
                    }
                    Relation::Genres => self.genre_columns(&film.id, &mut data),
                }
                SourceRow::new(film.id.clone(), film.changed_at, data)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyset_paging_keeps_ties() {
        let mut source = ScriptedSource::new();
        for n in 1..=3 {
            source.add_film(&uuid(n), ts("2021-01-01"), "Tie");
        }

        let first = source
            .changed_since(Scan::Root, &ScanPosition::start(ts("2010-01-01")), 2)
            .await
            .unwrap();
        let rest = source
            .changed_since(Scan::Root, &ScanPosition::past(&first[1]), 2)
            .await
            .unwrap();
        let ids: Vec<&str> = first.iter().chain(&rest).map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![uuid(1), uuid(2), uuid(3)]);
    }

    #[tokio::test]
    async fn test_owners_only_include_older_films() {
        let mut source = ScriptedSource::new();
        source.add_film(&uuid(1), ts("2021-01-01"), "Old");
        source.add_film(&uuid(2), ts("2023-01-01"), "New");
        source.add_person(&uuid(101), ts("2022-01-01"), "Ann", &[&uuid(1), &uuid(2)]);

        let linked_ids = vec![uuid(101)];
        let owners = source
            .changed_since(
                Scan::Owners {
                    relation: Relation::Persons,
                    linked_ids: &linked_ids,
                },
                &ScanPosition::start(ts("2010-01-01")),
                10,
            )
            .await
            .unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].id, uuid(1));
        assert_eq!(source.queries(), ["persons_film"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let mut source = ScriptedSource::new();
        source.fail_next_queries(1);
        let err = source
            .rows_by_id(Relation::Genres, &[])
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<QueryError>().unwrap().query, "genre_films");
        assert!(source.rows_by_id(Relation::Genres, &[]).await.is_ok());
    }
}
