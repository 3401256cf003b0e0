//! Service wiring: identity store selection, auth services, bootstrap seeding.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use pipeops_auth::{
    AuthorizationGuard, CatalogService, CatalogStore, CredentialVerifier, Hs256TokenCodec,
    IdentityStore, PasswordHasher, SessionHydrator, TokenService,
};
use pipeops_infra::InMemoryIdentityStore;

use crate::settings::{AuthSettings, BootstrapSettings, Settings, StoreBackend};

/// Everything a handler needs, shared behind one `Arc`.
pub struct AppServices {
    pub guard: AuthorizationGuard,
    pub verifier: CredentialVerifier,
    pub catalog: CatalogService,
    pub auth: AuthSettings,
}

impl AppServices {
    pub fn tokens(&self) -> &TokenService {
        self.guard.tokens()
    }
}

/// Build services over the configured identity store and run bootstrap seeding.
pub async fn build_services(settings: &Settings) -> anyhow::Result<AppServices> {
    let (identity, catalog) = open_store(settings).await?;

    let hasher = PasswordHasher::new(settings.auth.bcrypt_cost).context("invalid bcrypt cost")?;
    let codec = Arc::new(Hs256TokenCodec::new(settings.auth.signing_secret()));
    let tokens = TokenService::new(codec, identity.clone(), settings.auth.session_ttl());

    let services = AppServices {
        guard: AuthorizationGuard::new(tokens, SessionHydrator::new(identity.clone())),
        verifier: CredentialVerifier::new(identity, hasher.clone()),
        catalog: CatalogService::new(catalog, hasher),
        auth: settings.auth.clone(),
    };

    bootstrap(&services.catalog, &settings.bootstrap).await?;
    Ok(services)
}

async fn open_store(settings: &Settings) -> anyhow::Result<(Arc<dyn IdentityStore>, Arc<dyn CatalogStore>)> {
    match settings.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory identity store");
            let store = Arc::new(InMemoryIdentityStore::new());
            Ok((store.clone(), store))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let url = settings
                .store
                .database_url
                .as_deref()
                .context("store.database_url is required for the postgres backend")?;
            let store = pipeops_infra::PostgresIdentityStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to migrate identity schema")?;
            info!("using postgres identity store");
            let store = Arc::new(store);
            Ok((store.clone(), store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("postgres backend requested but pipeops-api was built without the `postgres` feature")
        }
    }
}

async fn bootstrap(catalog: &CatalogService, bootstrap: &BootstrapSettings) -> anyhow::Result<()> {
    if bootstrap.seed_catalog {
        catalog.seed_defaults().await.context("failed to seed default catalog")?;
    }

    if let (Some(email), Some(password)) = (&bootstrap.admin_email, &bootstrap.admin_password) {
        catalog
            .ensure_admin(&bootstrap.admin_name, email, password)
            .await
            .context("failed to create bootstrap administrator")?;
        info!("bootstrap administrator ensured");
    }
    Ok(())
}
