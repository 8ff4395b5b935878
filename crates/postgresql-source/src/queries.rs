//! Change-detection queries over the `content` schema.
//!
//! Every paged query takes the keyset position as `$1` (timestamp) and `$2`
//! (id, NULL at the start of a scan) and the page size as the last
//! parameter. Rows come back ordered by `(updated_at, id)`.

use sync_core::{Relation, Scan};

/// Fully denormalized films changed after the position.
pub const FILMS_CHANGED: &str = r#"
SELECT q.id::text AS id, q.updated_at::timestamptz AS updated_at, to_jsonb(q) AS data
FROM (
    SELECT
        fw.id,
        fw.title,
        fw.description,
        fw.rating AS imdb_rating,
        fw.updated_at,
        COALESCE(ARRAY_AGG(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
            FILTER (WHERE pfw.role = 'director' AND p.id IS NOT NULL), '{}') AS director,
        ARRAY_AGG(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
            FILTER (WHERE pfw.role = 'actor' AND p.id IS NOT NULL) AS actors,
        ARRAY_AGG(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
            FILTER (WHERE pfw.role = 'writer' AND p.id IS NOT NULL) AS writers,
        ARRAY_AGG(DISTINCT p.full_name)
            FILTER (WHERE pfw.role = 'actor' AND p.id IS NOT NULL) AS actors_names,
        ARRAY_AGG(DISTINCT p.full_name)
            FILTER (WHERE pfw.role = 'writer' AND p.id IS NOT NULL) AS writers_names,
        ARRAY_AGG(DISTINCT g.name) FILTER (WHERE g.id IS NOT NULL) AS genre
    FROM content.film_work fw
    LEFT JOIN content.person_film_work pfw ON pfw.film_work_id = fw.id
    LEFT JOIN content.person p ON p.id = pfw.person_id
    LEFT JOIN content.genre_film_work gfw ON gfw.film_work_id = fw.id
    LEFT JOIN content.genre g ON g.id = gfw.genre_id
    WHERE fw.updated_at > $1::timestamptz
        OR (fw.updated_at = $1::timestamptz AND fw.id > $2::uuid)
    GROUP BY fw.id
    ORDER BY fw.updated_at, fw.id
    LIMIT $3
) q
ORDER BY q.updated_at, q.id
"#;

pub const PERSONS_CHANGED: &str = r#"
SELECT p.id::text AS id, p.updated_at::timestamptz AS updated_at
FROM content.person p
WHERE p.updated_at > $1::timestamptz
    OR (p.updated_at = $1::timestamptz AND p.id > $2::uuid)
ORDER BY p.updated_at, p.id
LIMIT $3
"#;

pub const GENRES_CHANGED: &str = r#"
SELECT g.id::text AS id, g.updated_at::timestamptz AS updated_at
FROM content.genre g
WHERE g.updated_at > $1::timestamptz
    OR (g.updated_at = $1::timestamptz AND g.id > $2::uuid)
ORDER BY g.updated_at, g.id
LIMIT $3
"#;

/// Films linked to changed persons whose own timestamp predates the change.
pub const PERSON_OWNERS: &str = r#"
SELECT DISTINCT fw.id::text AS id, fw.updated_at::timestamptz AS updated_at, fw.id AS film_id
FROM content.film_work fw
JOIN content.person_film_work pfw ON pfw.film_work_id = fw.id
JOIN content.person p ON p.id = pfw.person_id
WHERE pfw.person_id = ANY($3::uuid[])
    AND p.updated_at > fw.updated_at
    AND (fw.updated_at > $1::timestamptz
        OR (fw.updated_at = $1::timestamptz AND fw.id > $2::uuid))
ORDER BY updated_at, film_id
LIMIT $4
"#;

pub const GENRE_OWNERS: &str = r#"
SELECT DISTINCT fw.id::text AS id, fw.updated_at::timestamptz AS updated_at, fw.id AS film_id
FROM content.film_work fw
JOIN content.genre_film_work gfw ON gfw.film_work_id = fw.id
JOIN content.genre g ON g.id = gfw.genre_id
WHERE gfw.genre_id = ANY($3::uuid[])
    AND g.updated_at > fw.updated_at
    AND (fw.updated_at > $1::timestamptz
        OR (fw.updated_at = $1::timestamptz AND fw.id > $2::uuid))
ORDER BY updated_at, film_id
LIMIT $4
"#;

/// Person fields of the given films.
pub const PERSON_FILMS: &str = r#"
SELECT q.film_id::text AS id, q.updated_at::timestamptz AS updated_at, to_jsonb(q) AS data
FROM (
    SELECT
        fw.id AS film_id,
        fw.updated_at,
        COALESCE(ARRAY_AGG(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
            FILTER (WHERE pfw.role = 'director' AND p.id IS NOT NULL), '{}') AS director,
        ARRAY_AGG(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
            FILTER (WHERE pfw.role = 'actor' AND p.id IS NOT NULL) AS actors,
        ARRAY_AGG(DISTINCT jsonb_build_object('id', p.id, 'name', p.full_name))
            FILTER (WHERE pfw.role = 'writer' AND p.id IS NOT NULL) AS writers,
        ARRAY_AGG(DISTINCT p.full_name)
            FILTER (WHERE pfw.role = 'actor' AND p.id IS NOT NULL) AS actors_names,
        ARRAY_AGG(DISTINCT p.full_name)
            FILTER (WHERE pfw.role = 'writer' AND p.id IS NOT NULL) AS writers_names
    FROM content.film_work fw
    LEFT JOIN content.person_film_work pfw ON pfw.film_work_id = fw.id
    LEFT JOIN content.person p ON p.id = pfw.person_id
    WHERE fw.id = ANY($1::uuid[])
    GROUP BY fw.id
) q
ORDER BY q.updated_at, q.film_id
"#;

/// Genre names of the given films.
pub const GENRE_FILMS: &str = r#"
SELECT q.film_id::text AS id, q.updated_at::timestamptz AS updated_at, to_jsonb(q) AS data
FROM (
    SELECT
        fw.id AS film_id,
        fw.updated_at,
        ARRAY_AGG(DISTINCT g.name) FILTER (WHERE g.id IS NOT NULL) AS genre
    FROM content.film_work fw
    LEFT JOIN content.genre_film_work gfw ON gfw.film_work_id = fw.id
    LEFT JOIN content.genre g ON g.id = gfw.genre_id
    WHERE fw.id = ANY($1::uuid[])
    GROUP BY fw.id
) q
ORDER BY q.updated_at, q.film_id
"#;

/// Query text of a paged scan.
pub fn scan_query(scan: &Scan<'_>) -> &'static str {
    match scan {
        Scan::Root => FILMS_CHANGED,
        Scan::Linked(Relation::Persons) => PERSONS_CHANGED,
        Scan::Linked(Relation::Genres) => GENRES_CHANGED,
        Scan::Owners {
            relation: Relation::Persons,
            ..
        } => PERSON_OWNERS,
        Scan::Owners {
            relation: Relation::Genres,
            ..
        } => GENRE_OWNERS,
    }
}

/// Query text of a by-id fetch.
pub fn films_query(relation: Relation) -> &'static str {
    match relation {
        Relation::Persons => PERSON_FILMS,
        Relation::Genres => GENRE_FILMS,
    }
}

/// Short name used in logs and [`sync_core::QueryError`]s.
pub fn scan_name(scan: &Scan<'_>) -> &'static str {
    match scan {
        Scan::Root => "film",
        Scan::Linked(Relation::Persons) => "person_id",
        Scan::Linked(Relation::Genres) => "genre_id",
        Scan::Owners {
            relation: Relation::Persons,
            ..
        } => "person_film_id",
        Scan::Owners {
            relation: Relation::Genres,
            ..
        } => "genre_film_id",
    }
}

pub fn films_name(relation: Relation) -> &'static str {
    match relation {
        Relation::Persons => "person_films",
        Relation::Genres => "genre_films",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_scans_bind_linked_ids_before_limit() {
        let ids = vec!["a".to_string()];
        for relation in [Relation::Persons, Relation::Genres] {
            let sql = scan_query(&Scan::Owners {
                relation,
                linked_ids: &ids,
            });
            assert!(sql.contains("ANY($3::uuid[])"));
            assert!(sql.contains("LIMIT $4"));
        }
    }

    #[test]
    fn test_paged_scans_use_keyset() {
        for scan in [
            Scan::Root,
            Scan::Linked(Relation::Persons),
            Scan::Linked(Relation::Genres),
        ] {
            let sql = scan_query(&scan);
            assert!(sql.contains("$2::uuid"), "{}", scan_name(&scan));
            assert!(sql.contains("LIMIT $3"), "{}", scan_name(&scan));
        }
    }

    #[test]
    fn test_by_id_queries_project_film_id() {
        assert!(films_query(Relation::Persons).contains("AS film_id"));
        assert!(films_query(Relation::Genres).contains("AS genre"));
        assert_eq!(films_name(Relation::Genres), "genre_films");
    }
}
