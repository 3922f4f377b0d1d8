//! Postgres bulk loader for generated levels.
//!
//! Three tables: `countries(h3 pk, country)`, `tiles(level, h3, region)`,
//! and `neighbors(level, region, neighbor)`. Inserts are batched to stay
//! under the Postgres wire limit of 65 535 bind parameters per statement.

use std::path::PathBuf;

use futures::future::try_join_all;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use crate::error::Result;
use crate::persistence;
use crate::region::{Level, TileToCountry};

const MAX_BIND_PARAMS: usize = 65_535;

/// Open a connection and drive it on a background task.
async fn connect(connect_string: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(connect_string, NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!("postgres connection error: {}", err);
        }
    });
    Ok(client)
}

async fn create_tables(client: &Client) -> Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS countries (
                h3 text PRIMARY KEY,
                country text
            );
            CREATE TABLE IF NOT EXISTS tiles (
                h3 text,
                region text,
                level int,
                PRIMARY KEY (level, h3)
            );
            CREATE TABLE IF NOT EXISTS neighbors (
                region text,
                neighbor text,
                level int,
                PRIMARY KEY (level, region, neighbor)
            );",
        )
        .await?;
    Ok(())
}

async fn populate_countries(client: &Client, tile_to_country: &TileToCountry) -> Result<()> {
    let rows: Vec<(String, String)> = tile_to_country
        .iter()
        .map(|(tile, country)| (tile.to_string(), country.to_lowercase()))
        .collect();

    for chunk in rows.chunks(MAX_BIND_PARAMS / 2) {
        let mut sql = String::from("INSERT INTO countries (h3, country) VALUES ");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 2);
        for (i, (h3, country)) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("(${},${})", i * 2 + 1, i * 2 + 2));
            params.push(h3);
            params.push(country);
        }
        client.execute(sql.as_str(), &params).await?;
    }
    Ok(())
}

async fn populate_tiles(client: &Client, level_index: i32, level: &Level) -> Result<()> {
    let rows: Vec<(String, String)> = level
        .iter()
        .flat_map(|(id, region)| {
            region
                .tiles
                .iter()
                .map(move |tile| (tile.to_string(), id.to_string()))
        })
        .collect();

    for chunk in rows.chunks(MAX_BIND_PARAMS / 3) {
        let mut sql = String::from("INSERT INTO tiles (h3, region, level) VALUES ");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 3);
        for (i, (h3, region)) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("(${},${},${})", i * 3 + 1, i * 3 + 2, i * 3 + 3));
            params.push(h3);
            params.push(region);
            params.push(&level_index);
        }
        client.execute(sql.as_str(), &params).await?;
    }
    Ok(())
}

async fn populate_neighbors(client: &Client, level_index: i32, level: &Level) -> Result<()> {
    let rows: Vec<(String, String)> = level
        .iter()
        .flat_map(|(id, region)| {
            region
                .neighbors
                .iter()
                .map(move |neighbor| (id.to_string(), neighbor.to_string()))
        })
        .collect();

    for chunk in rows.chunks(MAX_BIND_PARAMS / 3) {
        let mut sql = String::from("INSERT INTO neighbors (region, neighbor, level) VALUES ");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 3);
        for (i, (region, neighbor)) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("(${},${},${})", i * 3 + 1, i * 3 + 2, i * 3 + 3));
            params.push(region);
            params.push(neighbor);
            params.push(&level_index);
        }
        client.execute(sql.as_str(), &params).await?;
    }
    Ok(())
}

/// Create the tables, load the country map, then load every level file
/// concurrently, one connection per level.
pub async fn bulk_load(
    connect_string: &str,
    tile_to_country: &TileToCountry,
    level_paths: &[PathBuf],
) -> Result<()> {
    let client = connect(connect_string).await?;
    info!("creating tables");
    create_tables(&client).await?;
    info!("populating countries");
    populate_countries(&client, tile_to_country).await?;
    drop(client);

    info!("populating tiles and neighbors");
    let tasks = level_paths.iter().enumerate().map(|(index, path)| {
        let connect_string = connect_string.to_string();
        let path = path.clone();
        async move {
            let client = connect(&connect_string).await?;
            info!("reading level {} from {}", index, path.display());
            // Level paths may be URLs; the loader's HTTP fallback blocks,
            // so it runs on the blocking pool.
            let read_path = path.clone();
            let level: Level =
                tokio::task::spawn_blocking(move || persistence::read_json(&read_path))
                    .await
                    .map_err(|err| crate::error::EngineError::Io(std::io::Error::other(err)))??;
            info!("populating tiles for level {}", index);
            populate_tiles(&client, index as i32, &level).await?;
            info!("populating neighbors for level {}", index);
            populate_neighbors(&client, index as i32, &level).await?;
            Ok::<(), crate::error::EngineError>(())
        }
    });
    try_join_all(tasks).await?;
    Ok(())
}
