use bson::Bson;
use url::Url;

use crate::error::BrowserResult;
use crate::server::session::Session;

pub async fn handle_connect(session: &Session, url: Url) -> BrowserResult<Option<Bson>> {
    session.connect(url).await?;
    Ok(None)
}

pub async fn handle_reconnect(session: &Session, database: &str) -> BrowserResult<Option<Bson>> {
    session.reconnect(database).await?;
    Ok(None)
}
