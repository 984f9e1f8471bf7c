use rust_embed::RustEmbed;

/// Embedded database migrations
#[derive(RustEmbed)]
#[folder = "src/database/migrations/"]
#[prefix = "migrations/"]
pub struct MigrationAssets;

impl MigrationAssets {
    /// All migration files as `(file name, sql)`, sorted by file name
    pub fn get_migrations() -> Vec<(String, String)> {
        let mut migrations: Vec<(String, String)> = Self::iter()
            .filter_map(|file_path| {
                let file = Self::get(&file_path)?;
                let name = file_path
                    .strip_prefix("migrations/")
                    .unwrap_or(&file_path)
                    .to_string();
                Some((name, String::from_utf8_lossy(&file.data).to_string()))
            })
            .collect();

        migrations.sort_by(|a, b| a.0.cmp(&b.0));
        migrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_embedded_in_order() {
        let migrations = MigrationAssets::get_migrations();
        assert!(migrations.len() >= 2, "drones and positions migrations expected");
        for pair in migrations.windows(2) {
            assert!(pair[0].0 < pair[1].0, "migrations should be sorted by name");
        }
        assert!(migrations[0].1.contains("drones"));
    }
}
