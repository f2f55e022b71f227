pub mod http;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::modules::accounts::{AccountStore, JsonAccountStore, PasswordHasher, Pbkdf2Hasher};
use crate::modules::config::ServerConfig;
use crate::modules::protocol::{Dispatcher, SecretRegistry};
use crate::modules::service::{AccountService, AdminService};
use crate::modules::sessions::SessionTokenManager;
use crate::modules::utils::time::format_duration;

pub use http::{build_router, AppState};

/// Everything a running server owns, wired from a `ServerConfig`
pub struct Components {
    pub store: Arc<dyn AccountStore>,
    pub sessions: Arc<SessionTokenManager>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Components {
    pub fn build(config: &ServerConfig, hasher: Arc<dyn PasswordHasher>) -> Result<Self> {
        let store: Arc<dyn AccountStore> = Arc::new(
            JsonAccountStore::open(&config.accounts_file).with_context(|| {
                format!("open accounts file {}", config.accounts_file.display())
            })?,
        );
        let sessions = Arc::new(SessionTokenManager::new(config.token_ttl));

        let secrets = SecretRegistry::new(config.admin_secret.clone(), config.app_secrets.clone());
        if !secrets.has_admin_secret() {
            log::warn!("No admin secret configured; admin actions are disabled");
        }
        if secrets.app_secret_count() == 0 {
            log::warn!("No application secrets configured; only admin actions can succeed");
        }

        let dispatcher = Dispatcher::new(
            AccountService::new(store.clone(), hasher.clone(), sessions.clone()),
            AdminService::new(store.clone(), hasher, sessions.clone()),
            secrets,
        );
        Ok(Self {
            store,
            sessions,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// Run the HTTP(S) server until ctrl-c or a fatal storage failure
pub async fn run(config: ServerConfig) -> Result<()> {
    let components = Components::build(&config, Arc::new(Pbkdf2Hasher::new()))?;
    let sweeper = components.sessions.spawn_sweeper(config.sweep_interval);
    let state = AppState::new(components.dispatcher.clone());
    let fatal = state.fatal.clone();
    let app = build_router(state);

    log::info!(
        "Session tokens live for {}",
        format_duration(config.token_ttl.as_secs())
    );

    let failed = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let shutdown = {
        let failed = failed.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => log::info!("Shutting down on interrupt"),
                _ = fatal.notified() => {
                    log::error!("Shutting down: account storage can no longer be trusted");
                    failed.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            }
        }
    };

    match &config.tls {
        Some(tls) => {
            let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .with_context(|| format!("load TLS certificate {}", tls.cert.display()))?;
            let handle = axum_server::Handle::new();
            let signal_handle = handle.clone();
            tokio::spawn(async move {
                shutdown.await;
                signal_handle.graceful_shutdown(Some(Duration::from_secs(10)));
            });
            log::info!("Listening on https://{}", config.listen);
            axum_server::bind_rustls(config.listen, rustls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("serve https")?;
        }
        None => {
            log::warn!("No certificate and key provided; TLS is disabled");
            let listener = tokio::net::TcpListener::bind(config.listen)
                .await
                .with_context(|| format!("bind {}", config.listen))?;
            log::info!("Listening on http://{}", config.listen);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
                .context("serve http")?;
        }
    }

    sweeper.abort();
    components.sessions.close();
    components.store.close().context("close account storage")?;

    if failed.load(std::sync::atomic::Ordering::SeqCst) {
        anyhow::bail!("stopped after an account storage failure");
    }
    log::info!("Server stopped");
    Ok(())
}
