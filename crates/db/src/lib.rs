pub mod indexes;
pub mod models;

use hirewire_config::MongoSettings;
use mongodb::{Client, Database};
use tracing::info;

/// Connects to MongoDB and returns a handle to the configured database.
pub async fn connect(settings: &MongoSettings) -> Result<Database, mongodb::error::Error> {
    let client = Client::with_uri_str(&settings.uri).await?;
    let db = client.database(&settings.database);

    // Round-trip a ping so startup fails fast on a bad URI.
    db.run_command(bson::doc! { "ping": 1 }).await?;
    info!(database = %settings.database, "Connected to MongoDB");

    Ok(db)
}
