use bpindex_config::{config::get_config, utils::resolve_path};
use bpindex_core::{BpIndexError, BpIndexResult};
use bpindex_db::{DbConnection, DbError, IndexRepository, IndexedBuildpack};
use nu_ansi_term::Color::{Blue, Cyan, Green, LightRed};
use tracing::info;

use crate::utils::Colored;

/// Splits `namespace/name[@version]`.
pub fn parse_identity(query: &str) -> BpIndexResult<(&str, &str, Option<&str>)> {
    let invalid = || BpIndexError::InvalidIdentity(query.to_string());

    let (id, version) = match query.split_once('@') {
        Some((id, version)) if !version.is_empty() => (id, Some(version)),
        Some(_) => return Err(invalid()),
        None => (query, None),
    };

    match id.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace, name, version))
        }
        _ => Err(invalid()),
    }
}

fn print_buildpack(buildpack: &IndexedBuildpack) {
    info!(
        "{}/{}@{}",
        Colored(Blue, &buildpack.namespace),
        Colored(Blue, &buildpack.name),
        Colored(LightRed, &buildpack.version)
    );
    info!("  address:    {}", Colored(Cyan, &buildpack.address));
    info!("  id:         {}", buildpack.metadata_id);
    if !buildpack.homepage.is_empty() {
        info!("  homepage:   {}", buildpack.homepage);
    }
    info!("  stacks:     {}", buildpack.stacks.join(", "));
    info!("  indexed at: {}", Colored(Green, &buildpack.indexed_at));
}

pub fn show_buildpack(query: &str, db: Option<&str>) -> BpIndexResult<()> {
    let (namespace, name, version) = parse_identity(query)?;

    let config = get_config();
    let db_path = match db {
        Some(path) => resolve_path(path)?,
        None => config.get_db_path()?,
    };
    let mut conn = DbConnection::open(db_path)?;

    let buildpacks: Vec<IndexedBuildpack> = match version {
        Some(version) => {
            IndexRepository::find(conn.conn(), namespace, name, version)
                .map_err(DbError::from)?
                .into_iter()
                .collect()
        }
        None => {
            IndexRepository::list_versions(conn.conn(), namespace, name)
                .map_err(DbError::from)?
        }
    };

    if buildpacks.is_empty() {
        info!("{query} is not indexed");
        return Ok(());
    }

    for buildpack in &buildpacks {
        print_buildpack(buildpack);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity() {
        assert_eq!(
            parse_identity("heroku/nodejs@1.0.0").unwrap(),
            ("heroku", "nodejs", Some("1.0.0"))
        );
        assert_eq!(
            parse_identity("heroku/nodejs").unwrap(),
            ("heroku", "nodejs", None)
        );
    }

    #[test]
    fn test_parse_identity_rejects_malformed() {
        for query in ["nodejs", "heroku/", "/nodejs", "heroku/nodejs@", "a/b/c@1"] {
            let err = parse_identity(query).unwrap_err();
            assert!(err.is_input_error(), "{query} should be rejected");
        }
    }
}
