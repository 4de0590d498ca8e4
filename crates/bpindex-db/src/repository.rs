//! Queries against the `buildpacks` table.

use diesel::{prelude::*, upsert::excluded};

use crate::{
    models::{IndexedBuildpack, NewBuildpack},
    schema::buildpacks,
};

pub struct IndexRepository;

impl IndexRepository {
    /// Creates or updates the row for `(namespace, name, version)`.
    ///
    /// On conflict the address, metadata ID, homepage and stacks are
    /// replaced; `id` and `indexed_at` keep their first values.
    pub fn upsert(conn: &mut SqliteConnection, record: &NewBuildpack) -> QueryResult<usize> {
        diesel::insert_into(buildpacks::table)
            .values(record)
            .on_conflict((buildpacks::namespace, buildpacks::name, buildpacks::version))
            .do_update()
            .set((
                buildpacks::address.eq(excluded(buildpacks::address)),
                buildpacks::metadata_id.eq(excluded(buildpacks::metadata_id)),
                buildpacks::homepage.eq(excluded(buildpacks::homepage)),
                buildpacks::stacks.eq(excluded(buildpacks::stacks)),
            ))
            .execute(conn)
    }

    pub fn find(
        conn: &mut SqliteConnection,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> QueryResult<Option<IndexedBuildpack>> {
        buildpacks::table
            .filter(buildpacks::namespace.eq(namespace))
            .filter(buildpacks::name.eq(name))
            .filter(buildpacks::version.eq(version))
            .select(IndexedBuildpack::as_select())
            .first(conn)
            .optional()
    }

    /// Every indexed version of `namespace/name`, oldest first.
    pub fn list_versions(
        conn: &mut SqliteConnection,
        namespace: &str,
        name: &str,
    ) -> QueryResult<Vec<IndexedBuildpack>> {
        buildpacks::table
            .filter(buildpacks::namespace.eq(namespace))
            .filter(buildpacks::name.eq(name))
            .order(buildpacks::id.asc())
            .select(IndexedBuildpack::as_select())
            .load(conn)
    }

    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        buildpacks::table.count().get_result(conn)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::connection::DbConnection;

    fn open() -> (TempDir, DbConnection) {
        let dir = tempdir().unwrap();
        let conn = DbConnection::open(dir.path().join("index.db")).unwrap();
        (dir, conn)
    }

    fn stacks(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn nodejs<'a>(version: &'a str, homepage: &'a str, stacks: &[String]) -> NewBuildpack<'a> {
        NewBuildpack::new(
            "heroku",
            "nodejs",
            version,
            "ghcr.io/heroku/nodejs@sha256:abc",
            "heroku/nodejs",
            homepage,
            stacks,
        )
    }

    #[test]
    fn test_upsert_inserts_and_finds() {
        let (_dir, mut db) = open();
        let record = nodejs(
            "1.0.0",
            "https://github.com/heroku/buildpacks-nodejs",
            &stacks(&["heroku-22", "io.buildpacks.stacks.bionic"]),
        );

        assert_eq!(IndexRepository::upsert(db.conn(), &record).unwrap(), 1);

        let found = IndexRepository::find(db.conn(), "heroku", "nodejs", "1.0.0")
            .unwrap()
            .unwrap();
        assert_eq!(found.identity(), "heroku/nodejs@1.0.0");
        assert_eq!(found.metadata_id, "heroku/nodejs");
        assert_eq!(found.stacks, stacks(&["heroku-22", "io.buildpacks.stacks.bionic"]));
        assert_eq!(IndexRepository::count(db.conn()).unwrap(), 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (_dir, mut db) = open();
        let record = nodejs("1.0.0", "https://example.com", &stacks(&["heroku-22"]));

        IndexRepository::upsert(db.conn(), &record).unwrap();
        let first = IndexRepository::find(db.conn(), "heroku", "nodejs", "1.0.0")
            .unwrap()
            .unwrap();

        let again = nodejs("1.0.0", "https://example.com", &stacks(&["heroku-22"]));
        IndexRepository::upsert(db.conn(), &again).unwrap();
        let second = IndexRepository::find(db.conn(), "heroku", "nodejs", "1.0.0")
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(IndexRepository::count(db.conn()).unwrap(), 1);
    }

    #[test]
    fn test_upsert_updates_content_but_keeps_indexed_at() {
        let (_dir, mut db) = open();
        IndexRepository::upsert(db.conn(), &nodejs("1.0.0", "", &stacks(&["a"]))).unwrap();
        let first = IndexRepository::find(db.conn(), "heroku", "nodejs", "1.0.0")
            .unwrap()
            .unwrap();

        let mut changed = nodejs("1.0.0", "https://new.example", &stacks(&["b", "a"]));
        changed.indexed_at = "2000-01-01T00:00:00+00:00".to_string();
        IndexRepository::upsert(db.conn(), &changed).unwrap();

        let updated = IndexRepository::find(db.conn(), "heroku", "nodejs", "1.0.0")
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.indexed_at, first.indexed_at);
        assert_eq!(updated.homepage, "https://new.example");
        assert_eq!(updated.stacks, stacks(&["b", "a"]));
    }

    #[test]
    fn test_find_missing_and_list_versions() {
        let (_dir, mut db) = open();
        assert!(IndexRepository::find(db.conn(), "heroku", "nodejs", "1.0.0")
            .unwrap()
            .is_none());

        IndexRepository::upsert(db.conn(), &nodejs("1.0.0", "", &[])).unwrap();
        IndexRepository::upsert(db.conn(), &nodejs("1.1.0", "", &[])).unwrap();

        let versions = IndexRepository::list_versions(db.conn(), "heroku", "nodejs").unwrap();
        let versions: Vec<_> = versions.iter().map(|b| b.version.as_str()).collect();
        assert_eq!(versions, ["1.0.0", "1.1.0"]);
        assert!(IndexRepository::list_versions(db.conn(), "heroku", "go")
            .unwrap()
            .is_empty());
    }
}
