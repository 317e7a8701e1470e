use rand::{thread_rng, Rng};
use std::sync::Arc;
use tower::make::Shared;

use dapodik::config::Config;
use dapodik::session::{spawn_purge_task, SessionStore};
use dapodik::store::{AdminStore, MemoryStore, PgStore, StudentStore};
use dapodik::{app, auth, AppState};

async fn prepare<S>(store: Arc<S>, config: &Config, secret: &[u8]) -> anyhow::Result<AppState>
where
    S: StudentStore + AdminStore + SessionStore + 'static,
{
    if let Some((username, password)) = &config.seed_admin {
        auth::seed_admin(store.as_ref(), username, password).await?;
    }
    spawn_purge_task(store.clone(), config.session_purge_interval());
    Ok(AppState::new(store, config.session_ttl(), secret)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::from_env()?;

    let secret = match &config.session_secret {
        Some(secret) => secret.as_bytes().to_vec(),
        None => {
            log::warn!("DAPODIK_SESSION_SECRET not set, sessions will not survive a restart");
            thread_rng().gen::<[u8; 32]>().to_vec()
        }
    };

    let state = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            prepare(Arc::new(store), &config, &secret).await?
        }
        None => {
            log::warn!("No DATABASE_URL configured, keeping data in memory only");
            prepare(Arc::new(MemoryStore::new()), &config, &secret).await?
        }
    };

    log::info!(
        "Starting Dapodik admin HTTP server on http://{}",
        config.listen_addr
    );
    axum::Server::bind(&config.listen_addr)
        .serve(Shared::new(app(state)))
        .await?;
    Ok(())
}
